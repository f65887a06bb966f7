//! Kiwify webhook routes
//!
//! The provider gets `200 Webhook received` as soon as the body is read;
//! processing continues on a spawned task and its outcome only shows up in
//! the audit log.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use membergate_billing::{AuditQuery, AuditStatus, WebhookAuditRecord, WebhookReplayResult};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const WEBHOOK_ACK: &str = "Webhook received";

/// Receive a provider webhook.
///
/// The acknowledgement never depends on processing. The spawned task yields
/// once before touching any store, so the response is normally on its way
/// before the first database call; ordering with the socket flush is not
/// guaranteed beyond that.
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    // Unparseable bodies still get processed, and recorded as malformed
    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Webhook body is not valid JSON");
        Value::Null
    });

    let handler = state.billing.webhooks.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        handler.process(payload).await;
    });

    (StatusCode::OK, WEBHOOK_ACK)
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List audit records, newest first
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<Vec<WebhookAuditRecord>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<AuditStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let records = state
        .billing
        .webhooks
        .list_events(AuditQuery::new(status, query.limit, query.offset))
        .await?;

    Ok(Json(records))
}

/// Reprocess the stored payload of one audit record
pub async fn replay_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookReplayResult>> {
    let result = state.billing.webhooks.replay(id).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
        Router,
    };
    use membergate_billing::{
        BillingService, EmailConfig, MemoryAuditLog, MemoryUserStore, SubscriptionStatus,
        UserStore, WelcomeEmailService,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use crate::{auth::WEBHOOK_TOKEN_HEADER, config::Config, routes::create_router, state::AppState};

    use super::*;

    struct TestApp {
        router: Router,
        users: Arc<MemoryUserStore>,
        audit: Arc<MemoryAuditLog>,
    }

    fn app(secret: Option<&str>) -> TestApp {
        let secret = secret.map(str::to_string);
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "WEBHOOK_SECRET" => secret.clone(),
            _ => None,
        })
        .unwrap();

        let users = Arc::new(MemoryUserStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let billing = BillingService::with_stores(
            users.clone(),
            audit.clone(),
            Arc::new(WelcomeEmailService::new(EmailConfig::default())),
        );

        TestApp {
            router: create_router(AppState::new(config, billing)),
            users,
            audit,
        }
    }

    fn post_webhook(body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhooks/kiwify")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(WEBHOOK_TOKEN_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Wait for the spawned processing task to write its audit record
    async fn wait_for_records(audit: &MemoryAuditLog, count: usize) -> Vec<WebhookAuditRecord> {
        for _ in 0..200 {
            let records = audit.records().await;
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} audit records", count);
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_paid_webhook_acknowledged_and_processed() {
        let test = app(None);
        let body = json!({
            "event": "order.paid",
            "order": { "Customer": { "email": "A@X.com", "full_name": "Ana Silva" } }
        });

        let response = test
            .router
            .oneshot(post_webhook(&body.to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, WEBHOOK_ACK);

        let records = wait_for_records(&test.audit, 1).await;
        assert_eq!(records[0].status, AuditStatus::Processed);

        let user = test.users.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_acknowledged_before_processing_starts() {
        let test = app(None);
        let body = json!({ "event": "order.paid", "Customer": { "email": "early@x.com" } });

        let response = test
            .router
            .oneshot(post_webhook(&body.to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(test.audit.records().await.is_empty());
        assert_eq!(test.users.writes(), 0);

        let records = wait_for_records(&test.audit, 1).await;
        assert_eq!(records[0].customer_email.as_deref(), Some("early@x.com"));
    }

    #[tokio::test]
    async fn test_invalid_json_still_acknowledged() {
        let test = app(None);

        let response = test
            .router
            .oneshot(post_webhook("{not json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let records = wait_for_records(&test.audit, 1).await;
        assert_eq!(records[0].status, AuditStatus::Failed);
        assert_eq!(records[0].payload, Value::Null);
        assert_eq!(test.users.writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_processing_still_returns_200() {
        let test = app(None);
        let body = json!({ "event": "order.refunded", "Customer": { "email": "ghost@x.com" } });

        let response = test
            .router
            .oneshot(post_webhook(&body.to_string(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let records = wait_for_records(&test.audit, 1).await;
        assert_eq!(records[0].status, AuditStatus::Failed);
        assert_eq!(records[0].message, "User not found");
    }

    #[tokio::test]
    async fn test_health() {
        let test = app(None);
        let response = test
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_list_and_replay_events() {
        let test = app(Some("s3cret"));
        let body = json!({ "event": "order.refunded", "Customer": { "email": "late@x.com" } });

        test.router
            .clone()
            .oneshot(post_webhook(&body.to_string(), Some("s3cret")))
            .await
            .unwrap();
        let records = wait_for_records(&test.audit, 1).await;
        let failed_id = records[0].id;

        let response = test
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/webhooks/kiwify/events?status=failed&limit=10")
                    .header(WEBHOOK_TOKEN_HEADER, "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["status"], "failed");

        test.users
            .create(membergate_billing::NewUser {
                email: "late@x.com".to_string(),
                name: "Late".to_string(),
                password: "whatever1".to_string(),
                role: membergate_billing::UserRole::User,
                subscription_status: SubscriptionStatus::Active,
            })
            .await
            .unwrap();

        let response = test
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/webhooks/kiwify/events/{}/replay", failed_id))
                    .header(WEBHOOK_TOKEN_HEADER, "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let replay: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(replay["previous_status"], "failed");
        assert_eq!(replay["new_status"], "processed");
        assert_eq!(replay["success"], true);
        assert_eq!(test.audit.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_replay_unknown_id_is_404() {
        let test = app(Some("s3cret"));
        let response = test
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/webhooks/kiwify/events/{}/replay", Uuid::new_v4()))
                    .header(WEBHOOK_TOKEN_HEADER, "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status_filter() {
        let test = app(Some("s3cret"));
        let response = test
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/webhooks/kiwify/events?status=bogus")
                    .header(WEBHOOK_TOKEN_HEADER, "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
