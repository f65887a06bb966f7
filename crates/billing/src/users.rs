//! User accounts and the identity store seam
//!
//! Emails are the identity key. They are trimmed and lowercased before every
//! lookup or write, so `A@X.com` and `a@x.com` are the same account.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(BillingError::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}

/// Subscription status stored on the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Blocked,
    Deleted,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Blocked => "blocked",
            SubscriptionStatus::Deleted => "deleted",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "blocked" => Ok(SubscriptionStatus::Blocked),
            "deleted" => Ok(SubscriptionStatus::Deleted),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(BillingError::InvalidInput(format!(
                "unknown subscription status: {}",
                other
            ))),
        }
    }
}

/// Persisted user account
#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub subscription_status: SubscriptionStatus,
    pub avatar_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserAccount {
    /// Admins always have access, whatever their subscription status says
    pub fn has_access(&self) -> bool {
        self.role == UserRole::Admin || self.subscription_status == SubscriptionStatus::Active
    }
}

/// Input for creating a user. `password` is plaintext and is hashed by the store.
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
    pub subscription_status: SubscriptionStatus,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password", &"[redacted]")
            .field("role", &self.role)
            .field("subscription_status", &self.subscription_status)
            .finish()
    }
}

/// Result of an activation upsert
#[derive(Debug, Clone)]
pub struct Activation {
    pub user: UserAccount,
    /// True when the account did not exist and was inserted
    pub created: bool,
}

/// Trim and lowercase an email. Blank input yields `None`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}

/// Identity store used by the subscription mutator and the admin bootstrap.
///
/// All methods expect an already-normalized email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>>;

    /// Insert a new user. Fails with `Conflict` when the email is taken.
    async fn create(&self, user: NewUser) -> BillingResult<UserAccount>;

    /// Atomic upsert keyed by email: an existing account only gets its status
    /// set to `user.subscription_status`, a missing one is inserted.
    async fn activate_or_create(&self, user: NewUser) -> BillingResult<Activation>;

    /// Set the subscription status. Returns `None` without writing when no
    /// account has this email.
    async fn update_status(
        &self,
        email: &str,
        status: SubscriptionStatus,
    ) -> BillingResult<Option<UserAccount>>;
}
