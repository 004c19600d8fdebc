use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::recipient::{is_valid_email, Contact};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{var} is not a valid email address ({value})")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} must be a positive number ({value})")]
    InvalidNumber { var: &'static str, value: String },
}

/// Relay credentials and sender identity. Loaded once and never mutated.
#[derive(Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timeout: Duration,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub sender: Contact,
    pub cc: Option<Contact>,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("timeout", &self.timeout)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"***")
            .field("sender", &self.sender)
            .field("cc", &self.cc)
            .finish()
    }
}

impl MailConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(action = "load", component = "config", file_path = ?path, "Loaded .env file"),
            Err(e) => debug!(action = "load", component = "config", error = %e, "No .env file loaded"),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let address = |key: &'static str, value: String| {
            if is_valid_email(&value) {
                Ok(value)
            } else {
                Err(ConfigError::InvalidAddress { var: key, value })
            }
        };

        let smtp_user = address("SMTP_USER", required("SMTP_USER")?)?;
        let smtp_pass = required("SMTP_PASS")?;
        let sender = Contact {
            name: required("SENDER_NAME")?,
            email: address("SENDER_EMAIL", required("SENDER_EMAIL")?)?,
        };

        let cc = match (get("CC_NAME"), get("CC_EMAIL")) {
            (Some(name), Some(email)) => Some(Contact {
                name,
                email: address("CC_EMAIL", email)?,
            }),
            (None, Some(email)) => {
                address("CC_EMAIL", email)?;
                None
            }
            _ => None,
        };

        let smtp_port = match get("SMTP_PORT") {
            Some(value) => value
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "SMTP_PORT",
                    value,
                })?,
            None => DEFAULT_SMTP_PORT,
        };

        let timeout_secs = match get("SMTP_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|t| *t > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "SMTP_TIMEOUT_SECS",
                    value,
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            smtp_host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port,
            timeout: Duration::from_secs(timeout_secs),
            smtp_user,
            smtp_pass,
            sender,
            cc,
        };

        info!(
            action = "loaded",
            component = "config",
            smtp_host = %config.smtp_host,
            smtp_port = config.smtp_port,
            sender = %config.sender,
            cc = config.cc.is_some(),
            "Mail configuration loaded"
        );
        Ok(config)
    }
}
