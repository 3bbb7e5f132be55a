//! Configuration module for RepoWatch Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `REPOWATCH_ACCOUNTS` | Yes | - | Comma-separated accounts to watch |
//! | `REPOWATCH_CHECK_INTERVAL_SECS` | No | 1800 | Seconds between check passes |
//! | `REPOWATCH_GITHUB_TOKEN` | No | - | API token (unauthenticated if unset) |
//! | `REPOWATCH_API_URL` | No | `https://api.github.com` | API base URL |
//! | `REPOWATCH_STATE_DIR` | No | `~/.repowatch` | Directory for state and history files |
//! | `REPOWATCH_QUEUE_SIZE` | No | 1000 | Notification queue capacity |
//! | `REPOWATCH_SMTP_SERVER` | For mail | - | SMTP host (enables email settings) |
//! | `REPOWATCH_SMTP_PORT` | No | 465 | SMTP port (465 = implicit TLS) |
//! | `REPOWATCH_SMTP_SENDER` | With server | - | Sender address, also the SMTP login |
//! | `REPOWATCH_SMTP_PASSWORD` | With server | - | SMTP password or app token |
//! | `REPOWATCH_SMTP_RECEIVER` | With server | - | Recipient address |
//!
//! # Example
//!
//! ```no_run
//! use repowatch_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Watching: {}", config.accounts.join(", "));
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default seconds between check passes.
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1800;

/// Default API base URL.
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".repowatch";

/// Default notification queue capacity.
const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Default SMTP port (implicit TLS).
const DEFAULT_SMTP_PORT: u16 = 465;

/// State image file name inside the state directory.
const STATE_FILE_NAME: &str = "state.json";

/// Notification history file name inside the state directory.
const HISTORY_FILE_NAME: &str = "notifications.json";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// SMTP settings for notification delivery.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender", &self.sender)
            .field("password", &"<redacted>")
            .field("receiver", &self.receiver)
            .finish()
    }
}

impl EmailConfig {
    /// True when the connection should be TLS from the first byte rather than
    /// upgraded with STARTTLS.
    #[must_use]
    pub fn uses_implicit_tls(&self) -> bool {
        self.smtp_port == 465 || self.smtp_server.ends_with("qq.com")
    }
}

/// Configuration for the RepoWatch Monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Accounts to watch, deduplicated, in configuration order.
    pub accounts: Vec<String>,

    /// Time between the end of one check pass and the start of the next.
    pub check_interval: Duration,

    /// Optional API token.
    pub token: Option<String>,

    /// API base URL.
    pub api_url: String,

    /// Directory holding the state image and notification history.
    pub state_dir: PathBuf,

    /// Capacity of the notification queue.
    pub queue_size: usize,

    /// SMTP settings, `None` when `REPOWATCH_SMTP_SERVER` is unset.
    pub email: Option<EmailConfig>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `REPOWATCH_ACCOUNTS` is unset or lists no account
    /// - A numeric variable is set but is not a positive integer
    /// - `REPOWATCH_SMTP_SERVER` is set without sender, password or receiver
    /// - The home directory cannot be determined (needed for the default state dir)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_accounts = env::var("REPOWATCH_ACCOUNTS")
            .map_err(|_| ConfigError::MissingEnvVar("REPOWATCH_ACCOUNTS".to_string()))?;
        let accounts = parse_accounts(&raw_accounts);
        if accounts.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "REPOWATCH_ACCOUNTS".to_string(),
                message: "at least one account is required".to_string(),
            });
        }

        let check_interval = Duration::from_secs(parse_positive(
            "REPOWATCH_CHECK_INTERVAL_SECS",
            DEFAULT_CHECK_INTERVAL_SECS,
        )?);

        let token = env::var("REPOWATCH_GITHUB_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let api_url = env::var("REPOWATCH_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let state_dir = match env::var("REPOWATCH_STATE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs.home_dir().join(DEFAULT_STATE_DIR)
            }
        };

        let queue_size = parse_positive("REPOWATCH_QUEUE_SIZE", DEFAULT_QUEUE_SIZE as u64)? as usize;

        let email = match env::var("REPOWATCH_SMTP_SERVER") {
            Ok(smtp_server) => {
                let smtp_port = match env::var("REPOWATCH_SMTP_PORT") {
                    Ok(val) => val.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                        key: "REPOWATCH_SMTP_PORT".to_string(),
                        message: format!("expected port number, got '{val}'"),
                    })?,
                    Err(_) => DEFAULT_SMTP_PORT,
                };

                Some(EmailConfig {
                    smtp_server,
                    smtp_port,
                    sender: required("REPOWATCH_SMTP_SENDER")?,
                    password: required("REPOWATCH_SMTP_PASSWORD")?,
                    receiver: required("REPOWATCH_SMTP_RECEIVER")?,
                })
            }
            Err(_) => None,
        };

        Ok(Self {
            accounts,
            check_interval,
            token,
            api_url,
            state_dir,
            queue_size,
            email,
        })
    }

    /// Path of the persisted state image.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    /// Path of the notification history log.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join(HISTORY_FILE_NAME)
    }

    /// SMTP settings, required by every command that sends mail.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] naming `REPOWATCH_SMTP_SERVER`
    /// when email delivery is not configured.
    pub fn email_settings(&self) -> Result<&EmailConfig, ConfigError> {
        self.email
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REPOWATCH_SMTP_SERVER".to_string()))
    }
}

/// Splits a comma-separated account list, dropping blanks and duplicates.
fn parse_accounts(raw: &str) -> Vec<String> {
    let mut accounts: Vec<String> = Vec::new();
    for account in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !accounts.iter().any(|a| a == account) {
            accounts.push(account.to_string());
        }
    }
    accounts
}

fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}
