//! Server configuration
//!
//! Loaded once at startup and injected through `AppState`. Nothing below
//! the binary reads the environment.

use std::fmt;

use membergate_billing::EmailConfig;
use membergate_shared::DEFAULT_MAX_CONNECTIONS;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_ADMIN_NAME: &str = "Administrador";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Credentials for the administrator account created at startup
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    /// Shared secret expected in `x-webhook-token`; `None` leaves the
    /// webhook endpoint open and disables the operator routes
    pub webhook_secret: Option<String>,
    pub admin: Option<AdminSeed>,
    pub email: EmailConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("run_migrations", &self.run_migrations)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .field("admin", &self.admin)
            .field("email", &self.email)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_MAX_CONNECTIONS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let run_migrations = match var("RUN_MIGRATIONS") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                key: "RUN_MIGRATIONS",
                value: raw,
            })?,
            None => true,
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: var("ADMIN_NAME").unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            database_url,
            db_max_connections,
            run_migrations,
            webhook_secret: var("WEBHOOK_SECRET"),
            admin,
            email: EmailConfig::from_lookup(&lookup),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/membergate")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.db_max_connections, 10);
        assert!(config.run_migrations);
        assert!(config.webhook_secret.is_none());
        assert!(config.admin.is_none());
        assert!(config.email.api_key.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_empty_webhook_secret_is_unset() {
        let config = load(&[("DATABASE_URL", "postgres://db"), ("WEBHOOK_SECRET", "  ")]).unwrap();
        assert!(config.webhook_secret.is_none());

        let config = load(&[("DATABASE_URL", "postgres://db"), ("WEBHOOK_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_admin_seed_requires_email_and_password() {
        let config = load(&[("DATABASE_URL", "postgres://db"), ("ADMIN_EMAIL", "root@x.com")]).unwrap();
        assert!(config.admin.is_none());

        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("ADMIN_EMAIL", "root@x.com"),
            ("ADMIN_PASSWORD", "hunter22"),
        ])
        .unwrap();
        let admin = config.admin.unwrap();
        assert_eq!(admin.name, "Administrador");
        assert_eq!(admin.email, "root@x.com");
    }

    #[test]
    fn test_invalid_numbers_and_flags() {
        let err = load(&[("DATABASE_URL", "postgres://db"), ("DB_MAX_CONNECTIONS", "zero")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));

        let err = load(&[("DATABASE_URL", "postgres://db"), ("RUN_MIGRATIONS", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RUN_MIGRATIONS", .. }));

        let config = load(&[("DATABASE_URL", "postgres://db"), ("RUN_MIGRATIONS", "false")]).unwrap();
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("DATABASE_URL", "postgres://user:pw@db"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("ADMIN_EMAIL", "root@x.com"),
            ("ADMIN_PASSWORD", "hunter22"),
        ])
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("hunter22"));
        assert!(!rendered.contains("user:pw"));
    }
}
