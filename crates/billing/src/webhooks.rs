//! Provider webhook processing
//!
//! Runs after the HTTP acknowledgement has gone out. Every call ends in
//! exactly one audit record, whatever happened on the way: malformed body,
//! missing customer email, unknown user, or a database failure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditQuery, AuditStatus, NewAuditRecord, WebhookAuditRecord};
use crate::email::Notifier;
use crate::error::{BillingError, BillingResult};
use crate::payload::{resolve, WebhookPayload};
use crate::subscriptions::{PostCommitEffect, SubscriptionMutator, Transition};
use crate::users::UserStore;

pub const MALFORMED_PAYLOAD_MESSAGE: &str = "Invalid or empty webhook payload";
pub const MISSING_EMAIL_MESSAGE: &str = "Customer email not found in webhook payload";

/// Event name recorded when nothing could be classified
const UNKNOWN_EVENT: &str = "unknown";

/// Webhook handler for provider events
#[derive(Clone)]
pub struct WebhookHandler {
    audit: Arc<dyn AuditLog>,
    mutator: SubscriptionMutator,
    notifier: Arc<dyn Notifier>,
}

impl WebhookHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            audit,
            mutator: SubscriptionMutator::new(users),
            notifier,
        }
    }

    /// Process one inbound webhook body.
    ///
    /// Never fails. Returns the audit record, or `None` when the audit write
    /// itself failed (logged at error level).
    pub async fn process(&self, payload: Value) -> Option<WebhookAuditRecord> {
        let (record, effects) = self.evaluate(payload).await;

        tracing::info!(
            event = %record.event,
            status = %record.status,
            email = ?record.customer_email,
            message = %record.message,
            "Webhook processed"
        );

        let stored = self.record(record).await;

        // Effect failures are logged inside and never touch the stored outcome
        self.run_effects(effects).await;

        stored
    }

    /// Classify, resolve and mutate. Produces the audit record to write plus
    /// any post-commit effects.
    async fn evaluate(&self, payload: Value) -> (NewAuditRecord, Vec<PostCommitEffect>) {
        let Some(parsed) = WebhookPayload::from_value(&payload) else {
            tracing::warn!("Webhook payload is empty or not a JSON object");
            let record = NewAuditRecord::new(
                UNKNOWN_EVENT,
                AuditStatus::Failed,
                MALFORMED_PAYLOAD_MESSAGE,
                payload,
            );
            return (record, Vec::new());
        };

        let resolution = resolve(&parsed);
        let event = resolution.event().clone();

        tracing::debug!(
            event = %event,
            source = ?resolution.classification.source,
            shape = ?parsed.shape,
            order_id = ?parsed.order.order_id,
            product = ?parsed.order.product_name,
            "Webhook classified"
        );

        let Some(email) = resolution.customer_email.clone() else {
            tracing::warn!(event = %event, "Webhook has no customer email");
            let record = NewAuditRecord::new(
                event.name(),
                AuditStatus::Failed,
                MISSING_EMAIL_MESSAGE,
                payload,
            );
            return (record, Vec::new());
        };

        let Some(transition) = Transition::for_event(&event) else {
            tracing::info!(event = %event, email = %email, "Unhandled webhook event");
            let record = NewAuditRecord::new(
                event.name(),
                AuditStatus::Received,
                format!("Unhandled event: {}", event),
                payload,
            )
            .customer_email(Some(email));
            return (record, Vec::new());
        };

        let outcome = self
            .mutator
            .apply(transition, &email, &resolution.customer)
            .await;

        let record = NewAuditRecord::new(event.name(), outcome.status, outcome.message, payload)
            .customer_email(Some(email));
        (record, outcome.effects)
    }

    async fn record(&self, record: NewAuditRecord) -> Option<WebhookAuditRecord> {
        let event = record.event.clone();
        let email = record.customer_email.clone();
        let status = record.status;

        match self.audit.append(record).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                // The state change (if any) already happened; this leaves it without
                // an audit trail, so make it loud.
                tracing::error!(
                    event = %event,
                    email = ?email,
                    status = %status,
                    error = ?e,
                    "CRITICAL: Failed to write webhook audit record"
                );
                None
            }
        }
    }

    /// Run effects one by one. Each gets its own result; none aborts the rest.
    async fn run_effects(&self, effects: Vec<PostCommitEffect>) -> Vec<BillingResult<()>> {
        let mut results = Vec::with_capacity(effects.len());

        for effect in effects {
            let result = match &effect {
                PostCommitEffect::SendWelcome {
                    email,
                    first_name,
                    provisional_password,
                } => {
                    self.notifier
                        .send_welcome(email, first_name, provisional_password)
                        .await
                }
            };

            if let Err(e) = &result {
                tracing::error!(effect = ?effect, error = %e, "Post-commit effect failed");
            }
            results.push(result);
        }

        results
    }

    // ============ OPERATOR FUNCTIONALITY ============

    /// List audit records, newest first
    pub async fn list_events(&self, query: AuditQuery) -> BillingResult<Vec<WebhookAuditRecord>> {
        self.audit.list(query).await
    }

    /// Re-run the stored payload of an audit record.
    ///
    /// Records are immutable, so the replay produces a new record; the original
    /// stays as it was.
    pub async fn replay(&self, record_id: Uuid) -> BillingResult<WebhookReplayResult> {
        let original = self.audit.get(record_id).await?.ok_or_else(|| {
            BillingError::NotFound(format!("Webhook record {} not found", record_id))
        })?;

        tracing::info!(
            record_id = %record_id,
            event = %original.event,
            previous_status = %original.status,
            "Replaying webhook"
        );

        let replayed = self.process(original.payload.clone()).await.ok_or_else(|| {
            BillingError::Database("Failed to write audit record for replay".to_string())
        })?;

        tracing::info!(
            record_id = %record_id,
            replay_record_id = %replayed.id,
            new_status = %replayed.status,
            "Webhook replay completed"
        );

        Ok(WebhookReplayResult {
            record_id,
            replay_record_id: replayed.id,
            event: replayed.event,
            previous_status: original.status,
            new_status: replayed.status,
            message: replayed.message,
            success: replayed.status != AuditStatus::Failed,
        })
    }
}

/// Result of a webhook replay operation
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReplayResult {
    pub record_id: Uuid,
    pub replay_record_id: Uuid,
    pub event: String,
    pub previous_status: AuditStatus,
    pub new_status: AuditStatus,
    pub message: String,
    pub success: bool,
}
