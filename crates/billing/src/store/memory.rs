//! In-memory stores
//!
//! Used by tests and local runs without a database. Data is lost when the
//! process exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditQuery, NewAuditRecord, WebhookAuditRecord};
use crate::error::{BillingError, BillingResult};
use crate::password::hash_password_blocking;
use crate::users::{Activation, NewUser, SubscriptionStatus, UserAccount, UserStore};

/// Identity store keyed by email
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserAccount>>,
    writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create/update writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    fn build(user: NewUser, password_hash: String) -> UserAccount {
        let now = OffsetDateTime::now_utc();
        UserAccount {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash,
            role: user.role,
            subscription_status: user.subscription_status,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create(&self, user: NewUser) -> BillingResult<UserAccount> {
        let password_hash = hash_password_blocking(user.password.clone()).await?;

        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(BillingError::Conflict(format!(
                "user {} already exists",
                user.email
            )));
        }

        let account = Self::build(user, password_hash);
        users.insert(account.email.clone(), account.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(account)
    }

    async fn activate_or_create(&self, user: NewUser) -> BillingResult<Activation> {
        let password_hash = hash_password_blocking(user.password.clone()).await?;

        // Lookup and insert happen under one write guard, matching the
        // single-statement upsert of the Postgres store.
        let mut users = self.users.write().await;
        let activation = match users.get_mut(&user.email) {
            Some(existing) => {
                existing.subscription_status = user.subscription_status;
                existing.updated_at = OffsetDateTime::now_utc();
                Activation {
                    user: existing.clone(),
                    created: false,
                }
            }
            None => {
                let account = Self::build(user, password_hash);
                users.insert(account.email.clone(), account.clone());
                Activation {
                    user: account,
                    created: true,
                }
            }
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(activation)
    }

    async fn update_status(
        &self,
        email: &str,
        status: SubscriptionStatus,
    ) -> BillingResult<Option<UserAccount>> {
        let mut users = self.users.write().await;
        let Some(existing) = users.get_mut(email) else {
            return Ok(None);
        };

        existing.subscription_status = status;
        existing.updated_at = OffsetDateTime::now_utc();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(existing.clone()))
    }
}

/// Append-only audit store
#[derive(Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<WebhookAuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order
    pub async fn records(&self) -> Vec<WebhookAuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: NewAuditRecord) -> BillingResult<WebhookAuditRecord> {
        let stored = WebhookAuditRecord {
            id: Uuid::new_v4(),
            source: record.source,
            event: record.event,
            status: record.status,
            message: record.message,
            payload: record.payload,
            customer_email: record.customer_email,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> BillingResult<Option<WebhookAuditRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list(&self, query: AuditQuery) -> BillingResult<Vec<WebhookAuditRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| match query.status {
                Some(status) => r.status == status,
                None => true,
            })
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}
