//! Service configuration loaded from environment variables.
//!
//! Every `from_env` has a `from_lookup` twin taking the variable source as a
//! closure, so parsing can be tested without touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;
use mailer::{DEFAULT_SCHEDULER_CRON, SmtpSettings};
use thiserror::Error;

use crate::fanout::DEFAULT_BATCH_SIZE;
use crate::telemetry::LogFormat;

/// Errors produced while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, key: &'static str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: value.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn seconds(&self, key: &'static str, default: Duration) -> Result<Duration> {
        self.parsed(key, default.as_secs()).map(Duration::from_secs)
    }
}

/// Settings shared by every service.
///
/// - `AMQP_URL`: broker URI (required)
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default depends on the service)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub amqp_url: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    fn load<F: Fn(&str) -> Option<String>>(vars: &Vars<F>, default_port: u16) -> Result<Self> {
        Ok(Self {
            host: vars
                .optional("HOST")
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: vars.parsed("PORT", default_port)?,
            amqp_url: vars.required("AMQP_URL")?,
            log_format: vars.parsed("LOG_FORMAT", LogFormat::Text)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn load<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<Self> {
        Ok(Self {
            url: vars.required("DATABASE_URL")?,
            max_connections: vars.parsed("DATABASE_MAX_CONNECTIONS", 25)?,
        })
    }
}

/// Web service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rate_cache_ttl: Duration,
    pub email_batch_size: usize,
}

impl WebConfig {
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        Ok(Self {
            server: ServerConfig::load(&vars, Self::DEFAULT_PORT)?,
            database: DatabaseConfig::load(&vars)?,
            rate_cache_ttl: vars.seconds("RATE_CACHE_TTL_SECS", domain::DEFAULT_RATE_CACHE_TTL)?,
            email_batch_size: vars.parsed("EMAIL_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
        })
    }
}

/// Customers service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomersConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

impl CustomersConfig {
    pub const DEFAULT_PORT: u16 = 8081;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        Ok(Self {
            server: ServerConfig::load(&vars, Self::DEFAULT_PORT)?,
            database: DatabaseConfig::load(&vars)?,
        })
    }
}

/// Mailer service configuration.
///
/// - `SMTP_HOST`, `SMTP_SENDER` (required)
/// - `SMTP_PORT` (default: `25`)
/// - `SMTP_USERNAME`, `SMTP_PASSWORD` (optional; both set enables STARTTLS)
/// - `SMTP_CONNECTION_POOL_SIZE` (default: `3`)
/// - `SCHEDULER_CRON`: six-field cron expression in UTC, seconds first
///   (default: `"0 0 10 * * *"`, daily at 10:00)
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub server: ServerConfig,
    pub smtp: SmtpSettings,
    pub connection_pool_size: usize,
    pub scheduler_schedule: Schedule,
}

impl MailerConfig {
    pub const DEFAULT_PORT: u16 = 8082;

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        let expression = vars
            .optional("SCHEDULER_CRON")
            .unwrap_or_else(|| DEFAULT_SCHEDULER_CRON.to_string());
        let scheduler_schedule =
            Schedule::from_str(expression.trim()).map_err(|e| ConfigError::Invalid {
                key: "SCHEDULER_CRON",
                value: expression.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            server: ServerConfig::load(&vars, Self::DEFAULT_PORT)?,
            smtp: SmtpSettings {
                host: vars.required("SMTP_HOST")?,
                port: vars.parsed("SMTP_PORT", 25)?,
                username: vars.optional("SMTP_USERNAME"),
                password: vars.optional("SMTP_PASSWORD"),
                sender: vars.required("SMTP_SENDER")?,
            },
            connection_pool_size: vars.parsed("SMTP_CONNECTION_POOL_SIZE", 3)?,
            scheduler_schedule,
        })
    }
}
