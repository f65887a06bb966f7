//! Webhook authentication

pub mod middleware;
#[cfg(test)]
mod middleware_tests;

pub use middleware::{
    check_operator_token, check_webhook_token, require_operator_secret, require_webhook_secret,
    WebhookAuthError, WEBHOOK_TOKEN_HEADER,
};
