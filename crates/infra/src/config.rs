//! Configuration loading and representation.

use ::config::{Config, ConfigError, Environment, File, Source};
use serde::Deserialize;
use thiserror::Error;

use stockledger_inventory::LedgerConfig;
use stockledger_observability::LogConfig;
use stockledger_reporting::CompanyProfile;

/// Base name of the optional config file (`stockledger.toml`, `.yaml`, ...).
pub const CONFIG_FILE: &str = "stockledger";

/// Prefix for environment overrides, e.g. `STOCKLEDGER__DATABASE_URL`.
pub const ENV_PREFIX: &str = "STOCKLEDGER";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://stockledger.db?mode=rwc";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub company: CompanyProfile,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

impl AppConfig {
    fn validate(&self) -> Result<(), AppConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(AppConfigError::Validation(
                "database_url cannot be empty".to_string(),
            ));
        }
        self.company
            .validate()
            .map_err(|e| AppConfigError::Validation(format!("company: {e}")))
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `stockledger.{toml,yaml,json}` in the working directory, if present
/// 3. Environment variables (`STOCKLEDGER__*`, nested keys joined with `__`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_with(File::with_name(CONFIG_FILE).required(false))
}

fn load_with<S>(file: S) -> Result<AppConfig, AppConfigError>
where
    S: Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default(
            "ledger.max_conflict_retries",
            i64::from(LedgerConfig::default().max_conflict_retries),
        )?
        .set_default("log.json", true)?
        .set_default("log.filter", "info")?
        .add_source(file)
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}
