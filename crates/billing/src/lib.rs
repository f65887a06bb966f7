// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! MemberGate Billing Module
//!
//! Subscription state driven by payment-provider webhooks.
//!
//! ## Features
//!
//! - **Payload Resolution**: Tolerant parsing of wrapped or bare order payloads
//! - **Event Classification**: Explicit event name, then order status, then subscription status
//! - **State Transitions**: Activate (create on first payment), deactivate, block
//! - **Audit Log**: Exactly one immutable record per webhook call, with replay
//! - **Notifications**: Welcome email for auto-created subscribers

pub mod audit;
pub mod email;
pub mod error;
pub mod password;
pub mod payload;
pub mod store;
pub mod subscriptions;
pub mod users;
pub mod webhooks;


// Audit
pub use audit::{
    AuditLog, AuditQuery, AuditStatus, NewAuditRecord, WebhookAuditRecord, WEBHOOK_SOURCE,
};

// Email
pub use email::{EmailConfig, Notifier, WelcomeEmailService};

// Error
pub use error::{BillingError, BillingResult};

// Password
pub use password::{hash_password, verify_password};

// Payload
pub use payload::{
    classify, resolve, Classification, ClassificationSource, CustomerFields, EventKind,
    PayloadShape, Resolution, WebhookPayload,
};

// Stores
pub use store::{MemoryAuditLog, MemoryUserStore, PgAuditLog, PgUserStore};

// Subscriptions
pub use subscriptions::{
    provisional_password, MutationOutcome, PostCommitEffect, SubscriptionMutator, Transition,
};

// Users
pub use users::{
    normalize_email, Activation, NewUser, SubscriptionStatus, UserAccount, UserRole, UserStore,
};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookReplayResult};

use std::sync::Arc;

use sqlx::PgPool;

/// Stores and services wired together
#[derive(Clone)]
pub struct BillingService {
    pub users: Arc<dyn UserStore>,
    pub audit: Arc<dyn AuditLog>,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Postgres-backed service
    pub fn new(pool: PgPool, email: EmailConfig) -> Self {
        Self::with_stores(
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgAuditLog::new(pool)),
            Arc::new(WelcomeEmailService::new(email)),
        )
    }

    /// Service over explicit stores (tests, local runs)
    pub fn with_stores(
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let webhooks = WebhookHandler::new(users.clone(), audit.clone(), notifier);
        Self {
            users,
            audit,
            webhooks,
        }
    }
}
