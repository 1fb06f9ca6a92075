//! Configuration module for earshot.
//!
//! Loads engine configuration from TOML files with environment variable
//! substitution.
//!
//! # Example
//!
//! ```toml
//! [dispatch]
//! interval_secs = 5
//!
//! [context]
//! window = 6
//! budget = 1500
//!
//! [delivery.webhook]
//! url = "${HIGHLIGHT_WEBHOOK_URL}"
//! timeout_ms = 5000
//! retries = 2
//! ```

use crate::delivery::{Delivery, LogDelivery, WebhookDelivery};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Dispatcher cadence
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

/// Transcript limits
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default = "default_budget")]
    pub budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            budget: default_budget(),
        }
    }
}

fn default_window() -> usize {
    crate::context::DEFAULT_CONTEXT_WINDOW
}

fn default_budget() -> usize {
    crate::context::DEFAULT_CONTENT_BUDGET
}

/// Engine-level knobs
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSection {
    /// Grace timeout for owners whose settings have not been seen yet
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u64,

    /// Command channel capacity
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            default_timeout_minutes: default_timeout_minutes(),
            command_buffer: default_command_buffer(),
        }
    }
}

fn default_timeout_minutes() -> u64 {
    5
}

fn default_command_buffer() -> usize {
    256
}

/// Delivery channel configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Webhook delivery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub retries: u32,
}

fn default_webhook_timeout_ms() -> u64 {
    10000
}

fn default_webhook_retries() -> u32 {
    2
}

impl EngineConfig {
    /// Load configuration from the default path or `EARSHOT_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("EARSHOT_CONFIG").unwrap_or_else(|_| "config/earshot.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: EngineConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            interval_secs = config.dispatch.interval_secs,
            context_window = config.context.window,
            webhook = config.delivery.webhook.is_some(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// The dispatch interval as a [`Duration`].
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.interval_secs)
    }

    /// The fallback grace window as a [`Duration`].
    pub fn default_grace(&self) -> Duration {
        Duration::from_secs(self.engine.default_timeout_minutes * 60)
    }

    /// Build the configured delivery channel.
    ///
    /// A configured webhook wins; otherwise notifications go to the
    /// structured log.
    pub fn build_delivery(&self) -> Arc<dyn Delivery> {
        match &self.delivery.webhook {
            Some(webhook) if !webhook.url.contains("${") => Arc::new(
                WebhookDelivery::new(&webhook.url)
                    .with_timeout(Duration::from_millis(webhook.timeout_ms))
                    .with_retries(webhook.retries),
            ),
            Some(webhook) => {
                warn!(
                    url = %webhook.url,
                    "Webhook URL contains unsubstituted environment variable, falling back to log delivery"
                );
                Arc::new(LogDelivery::new())
            }
            None => Arc::new(LogDelivery::new()),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch interval must be at least 1 second".into(),
            ));
        }

        if self.context.window == 0 {
            return Err(ConfigError::ValidationError(
                "context window must hold at least 1 message".into(),
            ));
        }

        if self.engine.command_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "command buffer must hold at least 1 entry".into(),
            ));
        }

        if let Some(webhook) = &self.delivery.webhook {
            if webhook.url.is_empty() {
                return Err(ConfigError::ValidationError(
                    "webhook delivery has empty URL".into(),
                ));
            }

            if webhook.url.contains("${") {
                warn!(
                    url = %webhook.url,
                    "Webhook URL contains unsubstituted environment variable"
                );
            } else if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "webhook URL must start with http:// or https://".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("substitution pattern is valid");

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}
