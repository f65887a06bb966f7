//! Shared-secret middleware for the webhook routes

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Header carrying the shared secret
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WebhookAuthError {
    #[error("Missing webhook token")]
    MissingToken,
    #[error("Invalid webhook token")]
    InvalidToken,
    /// Operator routes are off when no secret is configured
    #[error("Route disabled")]
    Disabled,
}

impl IntoResponse for WebhookAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookAuthError::MissingToken => (StatusCode::UNAUTHORIZED, "unauthorized"),
            WebhookAuthError::InvalidToken => (StatusCode::FORBIDDEN, "forbidden"),
            WebhookAuthError::Disabled => (StatusCode::NOT_FOUND, "not_found"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Compare two secrets without leaking the mismatch position through timing
fn secrets_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Gate decision. `expected == None` means no secret is configured.
pub fn check_webhook_token(
    expected: Option<&str>,
    provided: Option<&str>,
) -> Result<(), WebhookAuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    match provided {
        None => Err(WebhookAuthError::MissingToken),
        Some(token) if secrets_match(expected, token) => Ok(()),
        Some(_) => Err(WebhookAuthError::InvalidToken),
    }
}

/// Same check as [`check_webhook_token`], but with no secret configured the
/// route does not exist.
pub fn check_operator_token(
    expected: Option<&str>,
    provided: Option<&str>,
) -> Result<(), WebhookAuthError> {
    if expected.is_none() {
        return Err(WebhookAuthError::Disabled);
    }
    check_webhook_token(expected, provided)
}

fn provided_token(request: &Request) -> Option<&str> {
    // A header that is not valid visible ASCII can never match; treat it as a
    // wrong token rather than a missing one.
    request
        .headers()
        .get(WEBHOOK_TOKEN_HEADER)
        .map(|value| value.to_str().unwrap_or_default())
}

/// Middleware for the provider-facing webhook endpoint
pub async fn require_webhook_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match check_webhook_token(state.webhook_secret(), provided_token(&request)) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                path = %request.uri().path(),
                error = %err,
                "Webhook request rejected"
            );
            err.into_response()
        }
    }
}

/// Middleware for audit listing and replay
pub async fn require_operator_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match check_operator_token(state.webhook_secret(), provided_token(&request)) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                path = %request.uri().path(),
                error = %err,
                "Operator request rejected"
            );
            err.into_response()
        }
    }
}
