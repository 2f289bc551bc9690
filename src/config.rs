use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::currency::{ExchangeRate, DEFAULT_ILS_PER_USD};
use crate::services::bulk::BulkSettings;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_BULK_PACING_MS: u64 = 500;
const DEFAULT_BULK_CONCURRENCY: usize = 1;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Shekels per US dollar
    #[serde(default = "default_exchange_rate")]
    #[validate(custom = "validate_exchange_rate")]
    pub exchange_rate: Decimal,

    /// Delay between per-item calls of a bulk operation (milliseconds)
    #[serde(default = "default_bulk_pacing_ms")]
    pub bulk_pacing_ms: u64,

    /// Items of a bulk operation in flight at once
    #[serde(default = "default_bulk_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub bulk_concurrency: usize,

    /// Deadline for every store and renderer call (seconds)
    #[serde(default = "default_remote_timeout_secs")]
    #[validate(range(min = 1))]
    pub remote_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            exchange_rate: default_exchange_rate(),
            bulk_pacing_ms: default_bulk_pacing_ms(),
            bulk_concurrency: default_bulk_concurrency(),
            remote_timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Validated exchange rate. Fails only if the config was built by hand
    /// without going through validation.
    pub fn exchange_rate(&self) -> Result<ExchangeRate, crate::errors::ServiceError> {
        ExchangeRate::new(self.exchange_rate)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn bulk_settings(&self) -> BulkSettings {
        BulkSettings {
            pacing: Duration::from_millis(self.bulk_pacing_ms),
            concurrency: self.bulk_concurrency.max(1),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_exchange_rate() -> Decimal {
    DEFAULT_ILS_PER_USD
}
fn default_bulk_pacing_ms() -> u64 {
    DEFAULT_BULK_PACING_MS
}
fn default_bulk_concurrency() -> usize {
    DEFAULT_BULK_CONCURRENCY
}
fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_exchange_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate <= Decimal::ZERO {
        let mut err = ValidationError::new("exchange_rate");
        err.message = Some("exchange_rate must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("marketplace_billing={},marketplace_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("exchange_rate", DEFAULT_ILS_PER_USD.to_string())?
        .set_default("bulk_pacing_ms", DEFAULT_BULK_PACING_MS)?
        .set_default("bulk_concurrency", DEFAULT_BULK_CONCURRENCY as u64)?
        .set_default("remote_timeout_secs", DEFAULT_REMOTE_TIMEOUT_SECS)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
