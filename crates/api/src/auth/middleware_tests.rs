//! Unit tests for the webhook secret gate
//!
//! Tests cover:
//! - Gate decisions (no secret, missing header, mismatch, match)
//! - Operator routes disabled without a secret
//! - Rejection bodies and status codes through the router

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::IntoResponse,
        Router,
    };
    use membergate_billing::{
        BillingService, EmailConfig, MemoryAuditLog, MemoryUserStore, WelcomeEmailService,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::super::middleware::*;
    use crate::{config::Config, routes::create_router, state::AppState};

    fn router(secret: Option<&str>) -> (Router, Arc<MemoryAuditLog>) {
        let secret = secret.map(str::to_string);
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "WEBHOOK_SECRET" => secret.clone(),
            _ => None,
        })
        .unwrap();

        let audit = Arc::new(MemoryAuditLog::new());
        let billing = BillingService::with_stores(
            Arc::new(MemoryUserStore::new()),
            audit.clone(),
            Arc::new(WelcomeEmailService::new(EmailConfig::default())),
        );
        (create_router(AppState::new(config, billing)), audit)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(WEBHOOK_TOKEN_HEADER, token);
        }
        builder.body(Body::from("{}")).unwrap()
    }

    async fn error_of(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        body["error"].as_str().unwrap().to_string()
    }

    // ==================== Gate decisions ====================

    #[test]
    fn test_no_secret_configured_allows_everything() {
        assert_eq!(check_webhook_token(None, None), Ok(()));
        assert_eq!(check_webhook_token(None, Some("anything")), Ok(()));
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        assert_eq!(
            check_webhook_token(Some("s3cret"), None),
            Err(WebhookAuthError::MissingToken)
        );
    }

    #[test]
    fn test_wrong_token_is_forbidden() {
        for wrong in ["", "s3cre", "s3cret!", "S3CRET"] {
            assert_eq!(
                check_webhook_token(Some("s3cret"), Some(wrong)),
                Err(WebhookAuthError::InvalidToken),
                "token {:?} should be rejected",
                wrong
            );
        }
        assert_eq!(check_webhook_token(Some("s3cret"), Some("s3cret")), Ok(()));
    }

    #[test]
    fn test_operator_gate_disabled_without_secret() {
        assert_eq!(
            check_operator_token(None, Some("anything")),
            Err(WebhookAuthError::Disabled)
        );
        assert_eq!(check_operator_token(Some("s3cret"), Some("s3cret")), Ok(()));
    }

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(
            WebhookAuthError::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WebhookAuthError::InvalidToken.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebhookAuthError::Disabled.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    // ==================== Through the router ====================

    #[tokio::test]
    async fn test_webhook_without_header_gets_401_and_no_record() {
        let (router, audit) = router(Some("s3cret"));

        let response = router
            .oneshot(request("POST", "/api/webhooks/kiwify", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_of(response).await, "unauthorized");
        tokio::task::yield_now().await;
        assert!(audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_with_wrong_header_gets_403() {
        let (router, audit) = router(Some("s3cret"));

        let response = router
            .oneshot(request("POST", "/api/webhooks/kiwify", Some("nope")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_of(response).await, "forbidden");
        tokio::task::yield_now().await;
        assert!(audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_open_without_secret() {
        let (router, _) = router(None);

        let response = router
            .oneshot(request("POST", "/api/webhooks/kiwify", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_operator_routes_hidden_without_secret() {
        let (router, _) = router(None);

        let response = router
            .oneshot(request("GET", "/api/webhooks/kiwify/events", Some("anything")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_operator_routes_require_token() {
        let (router, _) = router(Some("s3cret"));

        let response = router
            .clone()
            .oneshot(request("GET", "/api/webhooks/kiwify/events", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(request("GET", "/api/webhooks/kiwify/events", Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
