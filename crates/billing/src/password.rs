//! Password hashing (argon2, PHC string format)

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{BillingError, BillingResult};

/// Hash a plaintext password
pub fn hash_password(password: &str) -> BillingResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BillingError::PasswordHash(e.to_string()))
}

/// Hash on the blocking pool; argon2 is deliberately CPU-heavy
pub async fn hash_password_blocking(password: String) -> BillingResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| BillingError::PasswordHash(e.to_string()))?
}

/// Check a plaintext password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
