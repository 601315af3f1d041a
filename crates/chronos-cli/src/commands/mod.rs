pub mod config;
pub mod cycle;
pub mod plan;
pub mod progress;

use std::sync::Arc;
use std::time::Duration;

use chronos_core::{Config, CycleStore, HttpCycleStore, SqliteCycleStore, StoreBackend};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Open the store selected in the `[store]` config section.
pub fn open_store(config: &Config) -> Result<Arc<dyn CycleStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn CycleStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(
            SqliteCycleStore::open()?.with_retention_days(config.store.retention_days),
        ),
        StoreBackend::Http => {
            if config.store.base_url.is_empty() {
                return Err("store.base_url must be set for the http backend".into());
            }
            Arc::new(HttpCycleStore::new(
                &config.store.base_url,
                Duration::from_secs(config.store.timeout_secs),
            )?)
        }
    };
    Ok(store)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
