//! Infrastructure layer: stores, directories, configuration, settings.

pub mod config;
pub mod memory;
pub mod settings;
pub mod sqlite;

#[cfg(test)]
mod integration_tests;

pub use self::config::{AppConfig, AppConfigError, load_config};
pub use memory::{InMemoryLedgerStore, InMemoryPartyDirectory, InMemoryUserDirectory};
pub use settings::{CompanySettings, SettingsError};
pub use sqlite::SqliteLedgerStore;
