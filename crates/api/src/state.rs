//! Application state

use std::sync::Arc;

use membergate_billing::BillingService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub billing: BillingService,
}

impl AppState {
    pub fn new(config: Config, billing: BillingService) -> Self {
        Self {
            config: Arc::new(config),
            billing,
        }
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.webhook_secret.as_deref()
    }
}
