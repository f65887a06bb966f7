//! Webhook audit log
//!
//! One immutable record per inbound webhook call. Records are append-only:
//! the core never updates or deletes them, and a replay writes a new record.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Provider tag written to every record
pub const WEBHOOK_SOURCE: &str = "kiwify";

/// Upper bound for a single listing page
pub const MAX_AUDIT_PAGE: i64 = 500;

/// Processing outcome of one webhook call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Accepted but no state change applies (unhandled event)
    Received,
    /// State transition applied
    Processed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Received => "received",
            AuditStatus::Processed => "processed",
            AuditStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(AuditStatus::Received),
            "processed" => Ok(AuditStatus::Processed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(BillingError::InvalidInput(format!(
                "unknown audit status: {}",
                other
            ))),
        }
    }
}

/// Record to append
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub source: String,
    pub event: String,
    pub status: AuditStatus,
    pub message: String,
    /// Raw payload, stored verbatim for forensic replay
    pub payload: serde_json::Value,
    pub customer_email: Option<String>,
}

impl NewAuditRecord {
    pub fn new(
        event: impl Into<String>,
        status: AuditStatus,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source: WEBHOOK_SOURCE.to_string(),
            event: event.into(),
            status,
            message: message.into(),
            payload,
            customer_email: None,
        }
    }

    pub fn customer_email(mut self, email: Option<String>) -> Self {
        self.customer_email = email;
        self
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAuditRecord {
    pub id: Uuid,
    pub source: String,
    pub event: String,
    pub status: AuditStatus,
    pub message: String,
    pub payload: serde_json::Value,
    pub customer_email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Listing filter, newest records first
#[derive(Debug, Clone, Copy)]
pub struct AuditQuery {
    pub status: Option<AuditStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQuery {
    pub fn new(status: Option<AuditStatus>, limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            status,
            limit: limit.unwrap_or(50).clamp(1, MAX_AUDIT_PAGE),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Append-only audit store
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: NewAuditRecord) -> BillingResult<WebhookAuditRecord>;

    async fn get(&self, id: Uuid) -> BillingResult<Option<WebhookAuditRecord>>;

    async fn list(&self, query: AuditQuery) -> BillingResult<Vec<WebhookAuditRecord>>;
}
