//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! A bearer token is never read from the TOML; `LEARNHUB_TOKEN` seeds an
//! ephemeral credential instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use payment::{DEFAULT_STATUS_PATH, PaymentConfig};
use serde::Deserialize;

/// Environment variable holding a token for this process only.
pub const TOKEN_ENV: &str = "LEARNHUB_TOKEN";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub payment: PaymentSection,
    #[serde(skip)]
    pub seed_token: Option<Secret<String>>,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

/// Where the durable credential lives. Without a file the durable scope
/// is kept in memory and nothing survives the process.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub credential_file: Option<PathBuf>,
}

/// Payment confirmation settings
#[derive(Debug, Deserialize)]
pub struct PaymentSection {
    #[serde(default = "default_payment_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

impl Default for PaymentSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_payment_timeout(),
            poll_interval_secs: default_poll_interval(),
            status_path: default_status_path(),
        }
    }
}

fn default_api_timeout() -> u64 {
    30
}

fn default_refresh_path() -> String {
    api_client::DEFAULT_REFRESH_PATH.to_string()
}

fn default_payment_timeout() -> u64 {
    90
}

fn default_poll_interval() -> u64 {
    3
}

fn default_status_path() -> String {
    DEFAULT_STATUS_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, validate it, then overlay
    /// environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.seed_token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.api.refresh_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "refresh_path must start with '/', got: {}",
                self.api.refresh_path
            )));
        }

        if self.payment.timeout_secs == 0 {
            return Err(common::Error::Config(
                "payment.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.payment.poll_interval_secs == 0
            || self.payment.poll_interval_secs >= self.payment.timeout_secs
        {
            return Err(common::Error::Config(format!(
                "poll_interval_secs must be between 1 and {} (payment timeout), got: {}",
                self.payment.timeout_secs - 1,
                self.payment.poll_interval_secs
            )));
        }

        if !self.payment.status_path.contains("{order_code}") {
            return Err(common::Error::Config(format!(
                "status_path must contain an {{order_code}} placeholder, got: {}",
                self.payment.status_path
            )));
        }

        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn payment_config(&self) -> PaymentConfig {
        PaymentConfig {
            timeout: Duration::from_secs(self.payment.timeout_secs),
            poll_interval: Duration::from_secs(self.payment.poll_interval_secs),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("learnhub.toml")
    }
}
