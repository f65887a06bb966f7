// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! MemberGate API Library
//!
//! HTTP ingress for provider webhooks: the shared-secret gate, routes,
//! configuration and the startup admin bootstrap.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
