//! Configuration for the alert delivery pipeline
//!
//! This module defines the `Config` struct and its sub-structs, holding the
//! webhook and serialization settings. It uses the `figment` crate to load
//! configuration from a `loghook.toml` file and merge it with environment
//! variables.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::serializer::SerializeLimits;

/// The main configuration struct for the pipeline.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the pipeline's own tracing output.
    pub log_level: String,
    /// Configuration for webhook alert delivery.
    pub webhook: WebhookConfig,
    /// Bounds applied when serializing attached errors.
    pub serializer: SerializerConfig,
}

/// Configuration for webhook alert delivery.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    /// Whether alert delivery is active at all.
    pub enabled: bool,
    /// Ordered endpoint URLs; the first is primary, the rest are failover
    /// targets. Must be non-empty when `enabled` is true.
    pub endpoints: Vec<String>,
    /// Delivery attempts per endpoint before failing over.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries, in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum characters in a formatted alert message.
    pub max_message_length: usize,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Bounds applied when serializing attached errors.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerializerConfig {
    /// Maximum characters kept from a stack trace.
    pub stack_limit: usize,
    /// Maximum characters kept from an HTTP response body.
    pub response_data_limit: usize,
    /// Maximum serialized cause-chain depth.
    pub cause_max_depth: usize,
}

impl SerializerConfig {
    pub fn limits(&self) -> SerializeLimits {
        SerializeLimits {
            stack_limit: self.stack_limit,
            response_data_limit: self.response_data_limit,
            cause_max_depth: self.cause_max_depth,
        }
    }
}

impl Config {
    /// Loads the configuration from the specified file.
    ///
    /// # Arguments
    /// * `config_path` - The path to the TOML configuration file.
    pub fn load(config_path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Allow overriding with environment variables, e.g., LOGHOOK_LOG_LEVEL=debug
            .merge(Env::prefixed("LOGHOOK_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the dispatcher cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.enabled && self.webhook.endpoints.is_empty() {
            anyhow::bail!("webhook alerting is enabled but no endpoints are configured");
        }
        if self.webhook.max_retries == 0 {
            anyhow::bail!("webhook.max_retries must be at least 1");
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            webhook: WebhookConfig::default(),
            serializer: SerializerConfig::default(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoints: vec![],
            max_retries: 3,
            base_delay_ms: 200,
            max_message_length: 2000,
            request_timeout_secs: 5,
        }
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        let limits = SerializeLimits::default();
        Self {
            stack_limit: limits.stack_limit,
            response_data_limit: limits.response_data_limit,
            cause_max_depth: limits.cause_max_depth,
        }
    }
}
