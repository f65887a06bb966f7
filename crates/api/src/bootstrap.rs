//! Administrator account bootstrap

use membergate_billing::{
    normalize_email, BillingError, BillingResult, NewUser, SubscriptionStatus, UserAccount,
    UserRole, UserStore,
};

use crate::config::AdminSeed;

/// Create the configured administrator if no account exists for its email.
///
/// Returns the new account, or `None` when nothing was done.
pub async fn ensure_admin(
    users: &dyn UserStore,
    seed: Option<&AdminSeed>,
) -> BillingResult<Option<UserAccount>> {
    let Some(seed) = seed else {
        tracing::debug!("No admin credentials configured, skipping bootstrap");
        return Ok(None);
    };

    let Some(email) = normalize_email(&seed.email) else {
        return Err(BillingError::InvalidInput(format!(
            "ADMIN_EMAIL is not a usable address: {}",
            seed.email
        )));
    };

    if users.find_by_email(&email).await?.is_some() {
        tracing::debug!(email = %email, "Admin account already exists");
        return Ok(None);
    }

    let admin = NewUser {
        email: email.clone(),
        name: seed.name.clone(),
        password: seed.password.clone(),
        role: UserRole::Admin,
        subscription_status: SubscriptionStatus::Active,
    };

    match users.create(admin).await {
        Ok(account) => {
            tracing::info!(email = %email, user_id = %account.id, "Admin account created");
            Ok(Some(account))
        }
        // Another instance created it between the lookup and the insert
        Err(BillingError::Conflict(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membergate_billing::{verify_password, MemoryUserStore};

    fn seed() -> AdminSeed {
        AdminSeed {
            email: " Root@Example.com ".to_string(),
            password: "hunter22".to_string(),
            name: "Administrador".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_admin_once() {
        let users = MemoryUserStore::new();

        let created = ensure_admin(&users, Some(&seed())).await.unwrap().unwrap();
        assert_eq!(created.email, "root@example.com");
        assert_eq!(created.role, UserRole::Admin);
        assert_eq!(created.subscription_status, SubscriptionStatus::Active);
        assert!(verify_password("hunter22", &created.password_hash));

        let again = ensure_admin(&users, Some(&seed())).await.unwrap();
        assert!(again.is_none());
        assert_eq!(users.len().await, 1);
        assert_eq!(users.writes(), 1);
    }

    #[tokio::test]
    async fn test_no_seed_does_nothing() {
        let users = MemoryUserStore::new();
        assert!(ensure_admin(&users, None).await.unwrap().is_none());
        assert!(users.is_empty().await);
    }

    #[tokio::test]
    async fn test_existing_subscriber_is_left_alone() {
        let users = MemoryUserStore::new();
        users
            .create(NewUser {
                email: "root@example.com".to_string(),
                name: "Someone".to_string(),
                password: "other-pass".to_string(),
                role: UserRole::User,
                subscription_status: SubscriptionStatus::Inactive,
            })
            .await
            .unwrap();

        assert!(ensure_admin(&users, Some(&seed())).await.unwrap().is_none());
        let existing = users.find_by_email("root@example.com").await.unwrap().unwrap();
        assert_eq!(existing.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_unusable_email_is_rejected() {
        let users = MemoryUserStore::new();
        let mut bad = seed();
        bad.email = "   ".to_string();
        let err = ensure_admin(&users, Some(&bad)).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }
}
