//! Billing error types

use thiserror::Error;

/// Postgres SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return BillingError::Conflict(db.message().to_string());
            }
        }
        BillingError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::Email(e.to_string())
    }
}
