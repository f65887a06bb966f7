//! Subscriber notifications
//!
//! Welcome emails for auto-created accounts, sent through the Resend API.
//! Delivery is best effort: callers log failures and move on.

use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use serde_json::json;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::error::{BillingError, BillingResult};

const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com";
const DEFAULT_EMAIL_FROM: &str = "MemberGate <no-reply@membergate.app>";
const DEFAULT_APP_URL: &str = "http://localhost:3000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const WELCOME_SUBJECT: &str = "Bem-vindo(a)! Seu acesso está liberado";

/// Welcome body. Provider-supplied values are HTML-escaped by the template.
#[derive(Template)]
#[template(path = "welcome_email.html")]
struct WelcomeEmailTemplate<'a> {
    first_name: &'a str,
    email: &'a str,
    provisional_password: &'a str,
    login_url: &'a str,
}

/// Notification dispatcher seam
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(
        &self,
        email: &str,
        first_name: &str,
        provisional_password: &str,
    ) -> BillingResult<()>;
}

/// Email settings
#[derive(Clone)]
pub struct EmailConfig {
    /// Resend API key; `None` disables delivery
    pub api_key: Option<String>,
    pub from: String,
    /// Frontend base URL used for the login link
    pub app_url: String,
    pub api_url: String,
    /// Retries after the first attempt, for transient failures only
    pub max_retries: usize,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("from", &self.from)
            .field("app_url", &self.app_url)
            .field("api_url", &self.api_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from: DEFAULT_EMAIL_FROM.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            api_url: DEFAULT_RESEND_API_URL.to_string(),
            max_retries: 2,
        }
    }
}

impl EmailConfig {
    /// Read `RESEND_API_KEY`, `EMAIL_FROM`, `APP_URL` and `RESEND_API_URL`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EmailConfig::from_env`] over an arbitrary key lookup.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_key: var("RESEND_API_KEY"),
            from: var("EMAIL_FROM").unwrap_or(defaults.from),
            app_url: var("APP_URL").unwrap_or(defaults.app_url),
            api_url: var("RESEND_API_URL").unwrap_or(defaults.api_url),
            max_retries: defaults.max_retries,
        }
    }
}

/// Failure classification for the retry policy
#[derive(Debug)]
enum SendError {
    Transient(String),
    Permanent(String),
}

impl SendError {
    fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

impl From<SendError> for BillingError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Transient(msg) | SendError::Permanent(msg) => BillingError::Email(msg),
        }
    }
}

/// Welcome email sender backed by Resend
#[derive(Clone)]
pub struct WelcomeEmailService {
    config: EmailConfig,
    http: reqwest::Client,
}

impl WelcomeEmailService {
    pub fn new(config: EmailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn render(
        &self,
        first_name: &str,
        email: &str,
        provisional_password: &str,
    ) -> BillingResult<(String, String)> {
        let login_url = format!("{}/login", self.config.app_url.trim_end_matches('/'));
        let html = WelcomeEmailTemplate {
            first_name,
            email,
            provisional_password,
            login_url: &login_url,
        }
        .render()
        .map_err(|e| BillingError::Email(format!("welcome template: {}", e)))?;

        Ok((WELCOME_SUBJECT.to_string(), html))
    }

    async fn post_email(&self, api_key: &str, body: &serde_json::Value) -> Result<(), SendError> {
        let url = format!("{}/emails", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let message = format!("Resend returned {}: {}", status, detail);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(SendError::Transient(message))
        } else {
            Err(SendError::Permanent(message))
        }
    }
}

#[async_trait]
impl Notifier for WelcomeEmailService {
    async fn send_welcome(
        &self,
        email: &str,
        first_name: &str,
        provisional_password: &str,
    ) -> BillingResult<()> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::warn!(email = %email, "Welcome email skipped (RESEND_API_KEY not configured)");
            return Ok(());
        };

        let (subject, html) = self.render(first_name, email, provisional_password)?;
        let body = json!({
            "from": self.config.from,
            "to": [email],
            "subject": subject,
            "html": html,
        });

        // 100ms, 200ms, 400ms ... capped at 2s
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(Duration::from_secs(2))
            .take(self.config.max_retries);

        RetryIf::start(
            strategy,
            || self.post_email(api_key, &body),
            SendError::is_transient,
        )
        .await?;

        tracing::info!(email = %email, "Welcome email sent");
        Ok(())
    }
}
