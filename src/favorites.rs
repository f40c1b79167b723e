use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::storage::{KeyValueStorage, StorageError};

pub const FAVORITES_KEY: &str = "event_favorites";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("favorites read failed: {0}")]
    Read(StorageError),
    #[error("favorites write failed: {0}")]
    Write(#[from] StorageError),
    #[error("favorites encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("favorites task failed: {0}")]
    Task(String),
}

/// Persisted set of favorited event ids, stored as a JSON array under
/// [`FAVORITES_KEY`].
///
/// Mutations are read-modify-write cycles; they queue behind one lock so two
/// concurrent `add`/`remove` calls cannot lose each other's update.
#[derive(Clone)]
pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStorage>,
    mutations: Arc<AsyncMutex<()>>,
}

impl FavoritesStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            mutations: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Current favorites in insertion order. Never fails: an absent,
    /// unreadable or corrupted value reads as empty.
    pub async fn list(&self) -> Vec<String> {
        let storage = Arc::clone(&self.storage);
        match tokio::task::spawn_blocking(move || read_ids(storage.as_ref())).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!("favorites read task failed: {err}");
                Vec::new()
            }
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.list().await.iter().any(|existing| existing == id)
    }

    pub async fn add(&self, id: &str) -> Result<(), PersistenceError> {
        let id = id.to_string();
        self.mutate(move |ids| {
            if ids.contains(&id) {
                return false;
            }
            ids.push(id);
            true
        })
        .await
        .map(|_| ())
    }

    pub async fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        let id = id.to_string();
        self.mutate(move |ids| {
            let before = ids.len();
            ids.retain(|existing| existing != &id);
            ids.len() != before
        })
        .await
        .map(|_| ())
    }

    /// Flips membership of `id` and returns whether it is now a favorite.
    pub async fn toggle(&self, id: &str) -> Result<bool, PersistenceError> {
        let target = id.to_string();
        self.mutate(move |ids| {
            if let Some(pos) = ids.iter().position(|existing| existing == &target) {
                ids.remove(pos);
            } else {
                ids.push(target);
            }
            true
        })
        .await
        .map(|ids| ids.iter().any(|existing| existing == id))
    }

    /// Runs `change` against the stored ids under the mutation lock and
    /// writes the full result back when it reports a change.
    async fn mutate<F>(&self, change: F) -> Result<Vec<String>, PersistenceError>
    where
        F: FnOnce(&mut Vec<String>) -> bool + Send + 'static,
    {
        let _guard = self.mutations.lock().await;
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || -> Result<Vec<String>, PersistenceError> {
            let mut ids = load_ids(storage.as_ref()).map_err(PersistenceError::Read)?;
            if !change(&mut ids) {
                return Ok(ids);
            }
            let encoded = serde_json::to_string(&ids)?;
            storage.set(FAVORITES_KEY, &encoded)?;
            debug!("favorites persisted ({} ids)", ids.len());
            Ok(ids)
        })
        .await
        .map_err(|err| PersistenceError::Task(err.to_string()))?
    }
}

fn read_ids(storage: &dyn KeyValueStorage) -> Vec<String> {
    match load_ids(storage) {
        Ok(ids) => ids,
        Err(err) => {
            warn!("favorites read failed: {err}");
            Vec::new()
        }
    }
}

/// Reads the stored ids. Storage errors propagate; an undecodable value
/// reads as empty so the next write replaces it.
fn load_ids(storage: &dyn KeyValueStorage) -> Result<Vec<String>, StorageError> {
    let Some(raw) = storage.get(FAVORITES_KEY)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(mut ids) => {
            let mut seen = std::collections::HashSet::new();
            ids.retain(|id| seen.insert(id.clone()));
            Ok(ids)
        }
        Err(err) => {
            warn!("favorites decode failed, starting empty: {err}");
            Ok(Vec::new())
        }
    }
}
