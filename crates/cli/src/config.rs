//! # CLI Configuration
//!
//! Loads the `evalpanel` CLI configuration from `config.yml` and environment
//! variables. Values in the YAML file may reference environment variables as
//! `${VAR}`; they are substituted before parsing.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use evalpanel::{WatchConfig, WebhookConfig};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::info;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
#[allow(dead_code)]
pub struct AppConfig {
    /// Spreadsheet id or full spreadsheet URL. Loaded from `SHEET_ID`.
    #[serde(default = "default_sheet_id")]
    pub sheet_id: String,
    /// Overrides the export host of the sheet.
    #[serde(default)]
    pub sheets_base_url: Option<String>,
    #[serde(default = "default_add_metric_webhook")]
    pub add_metric_webhook: String,
    #[serde(default = "default_rate_webhook")]
    pub rate_webhook: String,
    /// Sent verbatim as the `Authorization` header of both webhooks.
    #[serde(default)]
    pub webhook_token: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_sheet_id() -> String {
    "1ABDpeyU3FGEdvd9vHHrln-hVX83NwCfA7fsqqDaXPVY".to_string()
}

fn default_add_metric_webhook() -> String {
    "https://n8n-staging.teljoy.io/webhook/add-eval-metric".to_string()
}

fn default_rate_webhook() -> String {
    "https://chadykarimfarah-manouella.app.n8n.cloud/webhook/add-eval-rating".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    1000
}

#[allow(dead_code)]
impl AppConfig {
    pub fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            add_metric_url: self.add_metric_webhook.clone(),
            rate_url: self.rate_webhook.clone(),
            auth_token: self.webhook_token.clone(),
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

// Helper to read a file, substitute env vars, and return its content.
// Returns Ok(None) if the file does not exist, or an error if it fails to read.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(format!("Regex compilation failed: {e}")))?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        let var_name = &caps["var"];
        env::var(var_name).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the CLI configuration from a file and environment variables.
///
/// - Without an override, `config.yml` next to the crate manifest is used if present;
///   an explicit override path must exist.
/// - Top-level keys like `sheet_id` are overridden by `SHEET_ID`.
/// - Any key can also be set with an `EVALPANEL_` prefix (e.g. `EVALPANEL_WEBHOOK_TOKEN`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder();

    match config_path_override {
        Some(path) => {
            let content = read_and_substitute(path)?.ok_or_else(|| {
                ConfigError::NotFound(format!("Config file not found at '{path}'."))
            })?;
            info!("Loading configuration from '{path}'.");
            builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
        }
        None => {
            let default_path = format!("{base_path}/config.yml");
            if let Some(content) = read_and_substitute(&default_path)? {
                info!("Loading configuration from '{default_path}'.");
                builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
            }
        }
    }

    let settings = builder
        // Top-level keys like SHEET_ID.
        .add_source(Environment::default())
        // Prefixed overrides.
        .add_source(
            Environment::with_prefix("EVALPANEL")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
