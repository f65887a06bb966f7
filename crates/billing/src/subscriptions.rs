//! Subscription state transitions
//!
//! Classified events map to one of three transitions on the user keyed by
//! email. Activation creates the account when it does not exist yet; the
//! other two never create. Side effects that must not affect the transition
//! (the welcome email) are returned as post-commit effects for the caller
//! to run.

use std::fmt;
use std::sync::Arc;

use crate::audit::AuditStatus;
use crate::error::BillingError;
use crate::payload::{CustomerFields, EventKind};
use crate::users::{NewUser, SubscriptionStatus, UserRole, UserStore};

/// Display name for auto-created users without a provider name
pub const DEFAULT_SUBSCRIBER_NAME: &str = "Novo Assinante";

/// Password base used when the first name yields too few characters
pub const PASSWORD_FALLBACK_BASE: &str = "aluno";

/// Fixed suffix appended to every provisional password
pub const PASSWORD_SUFFIX: &str = "123";

const MIN_PASSWORD_BASE_LEN: usize = 3;

/// Deterministic initial password: lowercased ASCII alphanumerics of the
/// first name (or the fallback base), followed by the fixed suffix.
pub fn provisional_password(first_name: Option<&str>) -> String {
    let base: String = first_name
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    let base = if base.len() < MIN_PASSWORD_BASE_LEN {
        PASSWORD_FALLBACK_BASE.to_string()
    } else {
        base
    };

    format!("{}{}", base, PASSWORD_SUFFIX)
}

/// State transition applied to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Deactivate,
    Block,
}

impl Transition {
    /// Transition for a classified event; `None` means no state change
    pub fn for_event(event: &EventKind) -> Option<Self> {
        match event {
            EventKind::OrderPaid => Some(Transition::Activate),
            EventKind::OrderRefunded
            | EventKind::OrderChargeback
            | EventKind::SubscriptionCancelled => Some(Transition::Deactivate),
            EventKind::SubscriptionOverdue => Some(Transition::Block),
            EventKind::Unhandled(_) => None,
        }
    }

    pub fn target_status(&self) -> SubscriptionStatus {
        match self {
            Transition::Activate => SubscriptionStatus::Active,
            Transition::Deactivate => SubscriptionStatus::Inactive,
            Transition::Block => SubscriptionStatus::Blocked,
        }
    }
}

/// Work to run after the state write succeeded
#[derive(Clone, PartialEq, Eq)]
pub enum PostCommitEffect {
    SendWelcome {
        email: String,
        first_name: String,
        provisional_password: String,
    },
}

impl fmt::Debug for PostCommitEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostCommitEffect::SendWelcome {
                email, first_name, ..
            } => f
                .debug_struct("SendWelcome")
                .field("email", email)
                .field("first_name", first_name)
                .field("provisional_password", &"[redacted]")
                .finish(),
        }
    }
}

/// Outcome of one transition, ready to be written to the audit log
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub status: AuditStatus,
    pub message: String,
    pub effects: Vec<PostCommitEffect>,
}

impl MutationOutcome {
    fn processed(message: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Processed,
            message: message.into(),
            effects: Vec::new(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Failed,
            message: message.into(),
            effects: Vec::new(),
        }
    }
}

/// Applies transitions through the identity store
#[derive(Clone)]
pub struct SubscriptionMutator {
    users: Arc<dyn UserStore>,
}

impl SubscriptionMutator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Apply `transition` to the user with `email` (already normalized).
    ///
    /// Store errors are logged and reported as a `failed` outcome, never returned.
    pub async fn apply(
        &self,
        transition: Transition,
        email: &str,
        customer: &CustomerFields,
    ) -> MutationOutcome {
        match transition {
            Transition::Activate => self.activate(email, customer).await,
            Transition::Deactivate | Transition::Block => self.set_status(email, transition).await,
        }
    }

    async fn activate(&self, email: &str, customer: &CustomerFields) -> MutationOutcome {
        let first_name = customer.first_name().unwrap_or_default().to_string();
        let password = provisional_password(Some(first_name.as_str()));
        let name = customer
            .full_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBSCRIBER_NAME.to_string());

        let new_user = NewUser {
            email: email.to_string(),
            name,
            password: password.clone(),
            role: UserRole::User,
            subscription_status: SubscriptionStatus::Active,
        };

        match self.users.activate_or_create(new_user).await {
            Ok(activation) if activation.created => {
                tracing::info!(
                    email = %email,
                    user_id = %activation.user.id,
                    "New subscriber created and activated"
                );
                let mut outcome = MutationOutcome::processed("User created and subscription activated");
                outcome.effects.push(PostCommitEffect::SendWelcome {
                    email: email.to_string(),
                    first_name,
                    provisional_password: password,
                });
                outcome
            }
            Ok(activation) => {
                tracing::info!(
                    email = %email,
                    user_id = %activation.user.id,
                    "Existing subscriber activated"
                );
                MutationOutcome::processed("Subscription activated")
            }
            Err(e) => Self::store_failure(email, Transition::Activate, e),
        }
    }

    async fn set_status(&self, email: &str, transition: Transition) -> MutationOutcome {
        let status = transition.target_status();
        match self.users.update_status(email, status).await {
            Ok(Some(user)) => {
                tracing::info!(
                    email = %email,
                    user_id = %user.id,
                    status = %status,
                    "Subscription status updated"
                );
                MutationOutcome::processed(format!("Subscription status set to {}", status))
            }
            Ok(None) => {
                tracing::warn!(email = %email, status = %status, "Webhook target user not found");
                MutationOutcome::failed("User not found")
            }
            Err(e) => Self::store_failure(email, transition, e),
        }
    }

    fn store_failure(email: &str, transition: Transition, e: BillingError) -> MutationOutcome {
        tracing::error!(
            email = %email,
            transition = ?transition,
            error = ?e,
            "Subscription transition failed"
        );
        MutationOutcome::failed(e.to_string())
    }
}
