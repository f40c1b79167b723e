pub mod app;
pub mod config;
pub mod favorites;
pub mod filters;
pub mod models;
pub mod sharing;
pub mod sources;
pub mod storage;
mod utils;

use std::sync::Arc;

pub use app::{AppError, EventBrowser, EventDetail, ReloadOutcome};
pub use config::{AppConfig, ConfigStore, SourceKind};
pub use favorites::{FavoritesStore, PersistenceError};
pub use models::{Event, FilterSpec, Period};
pub use sources::{EventSource, FetchError};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage, StorageError};

/// Wires the browser from the on-disk configuration and the default
/// SQLite store.
pub fn open_default() -> Result<EventBrowser, StorageError> {
    let config = ConfigStore::load().read();
    let storage = SqliteStorage::open_default()?;
    Ok(EventBrowser::from_config(&config, Arc::new(storage)))
}
