//! Postgres-backed stores (`users`, `webhook_logs`)

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditQuery, NewAuditRecord, WebhookAuditRecord};
use crate::error::{BillingError, BillingResult};
use crate::password::hash_password_blocking;
use crate::users::{Activation, NewUser, SubscriptionStatus, UserAccount, UserStore};

const USER_COLUMNS: &str = "id, email, name, password_hash, role, subscription_status, \
                            avatar_url, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, source, event, status, message, payload, customer_email, created_at";

/// Database row type for user lookups
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    subscription_status: String,
    avatar_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = BillingError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserAccount {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            subscription_status: row.subscription_status.parse()?,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upsert row; `inserted` comes from `xmax = 0`, which only holds for fresh tuples
#[derive(Debug, FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    user: UserRow,
    inserted: bool,
}

/// Identity store over the `users` table
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> BillingResult<UserAccount> {
        let password_hash = hash_password_blocking(user.password).await?;

        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, subscription_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&password_hash)
        .bind(user.role.as_str())
        .bind(user.subscription_status.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn activate_or_create(&self, user: NewUser) -> BillingResult<Activation> {
        // Hash up front: the statement decides insert vs update atomically,
        // so the hash has to be ready either way.
        let password_hash = hash_password_blocking(user.password).await?;

        let row: UpsertRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, subscription_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET
                subscription_status = EXCLUDED.subscription_status,
                updated_at = NOW()
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&password_hash)
        .bind(user.role.as_str())
        .bind(user.subscription_status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(Activation {
            created: row.inserted,
            user: row.user.try_into()?,
        })
    }

    async fn update_status(
        &self,
        email: &str,
        status: SubscriptionStatus,
    ) -> BillingResult<Option<UserAccount>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r#"
            UPDATE users SET subscription_status = $1, updated_at = NOW()
            WHERE email = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(status.as_str())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserAccount::try_from).transpose()
    }
}

/// Database row type for audit records
#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    source: String,
    event: String,
    status: String,
    message: String,
    payload: serde_json::Value,
    customer_email: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<AuditRow> for WebhookAuditRecord {
    type Error = BillingError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(WebhookAuditRecord {
            id: row.id,
            source: row.source,
            event: row.event,
            status: row.status.parse()?,
            message: row.message,
            payload: row.payload,
            customer_email: row.customer_email,
            created_at: row.created_at,
        })
    }
}

/// Audit store over the `webhook_logs` table
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, record: NewAuditRecord) -> BillingResult<WebhookAuditRecord> {
        let row: AuditRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO webhook_logs (id, source, event, status, message, payload, customer_email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {}
            "#,
            AUDIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&record.source)
        .bind(&record.event)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(&record.payload)
        .bind(&record.customer_email)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> BillingResult<Option<WebhookAuditRecord>> {
        let row: Option<AuditRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_logs WHERE id = $1",
            AUDIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WebhookAuditRecord::try_from).transpose()
    }

    async fn list(&self, query: AuditQuery) -> BillingResult<Vec<WebhookAuditRecord>> {
        let rows: Vec<AuditRow> = match query.status {
            Some(status) => sqlx::query_as(&format!(
                r#"
                SELECT {} FROM webhook_logs
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
                AUDIT_COLUMNS
            ))
            .bind(status.as_str())
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?,
            None => sqlx::query_as(&format!(
                r#"
                SELECT {} FROM webhook_logs
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
                AUDIT_COLUMNS
            ))
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?,
        };

        rows.into_iter().map(WebhookAuditRecord::try_from).collect()
    }
}
