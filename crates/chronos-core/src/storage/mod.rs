mod config;
pub mod database;
pub mod migrations;
pub mod remote;

pub use config::{Config, PlannerConfig, ProgressConfig, StoreBackend, StoreConfig, TimerConfig};
pub use database::SqliteCycleStore;
pub use remote::HttpCycleStore;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/chronos[-dev]/` based on CHRONOS_ENV.
///
/// Set CHRONOS_ENV=dev to use development data directory, or
/// CHRONOS_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = if let Ok(custom) = std::env::var("CHRONOS_DATA_DIR") {
        PathBuf::from(custom)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");

        let env = std::env::var("CHRONOS_ENV").unwrap_or_else(|_| "production".to_string());
        if env == "dev" {
            base_dir.join("chronos-dev")
        } else {
            base_dir.join("chronos")
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
