//! Registry of state managers sharing one store client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::manager::StateManager;
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::key_codec::CompositeKey;
use crate::store::{DynamoStateStore, SharedStateStore};

/// Hands out one [`StateManager`] per composite key and owns the shared store.
///
/// Repeated requests for an equal key return the same instance, so every
/// caller within an invocation sees the same pending writes.
pub struct StateManagerFactory {
    store: SharedStateStore,
    managers: Mutex<HashMap<CompositeKey, Arc<StateManager>>>,
}

impl std::fmt::Debug for StateManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManagerFactory").finish_non_exhaustive()
    }
}

impl StateManagerFactory {
    /// Creates a factory over an existing store.
    pub fn new(store: SharedStateStore) -> Self {
        Self {
            store,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a factory backed by the DynamoDB table named in `config`.
    pub async fn from_config(config: &RunnerConfig) -> Result<Self, RunnerError> {
        let table_name = config.state_table_name()?;
        tracing::debug!(table = table_name, "Creating DynamoDB state store");
        let store = DynamoStateStore::from_env(table_name).await;
        Ok(Self::new(Arc::new(store)))
    }

    /// Returns the shared store client.
    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// Returns the manager for `key`, creating it on first request.
    ///
    /// `ttl` only applies when the manager is created.
    pub async fn state_manager(
        &self,
        key: CompositeKey,
        ttl: Option<Duration>,
    ) -> Arc<StateManager> {
        let mut managers = self.managers.lock().await;
        managers
            .entry(key)
            .or_insert_with_key(|key| {
                Arc::new(StateManager::new(key.clone(), ttl, self.store.clone()))
            })
            .clone()
    }

    /// Returns the number of registered managers.
    pub async fn len(&self) -> usize {
        self.managers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.managers.lock().await.is_empty()
    }

    /// Flushes every registered manager that is still open.
    ///
    /// Every manager is attempted; the first failure is returned.
    pub async fn flush_all(&self) -> Result<(), RunnerError> {
        let managers: Vec<Arc<StateManager>> =
            self.managers.lock().await.values().cloned().collect();

        let mut first_error = None;
        for manager in managers {
            if manager.is_closed().await {
                continue;
            }
            if let Err(error) = manager.flush().await {
                tracing::warn!(key = %manager.key(), error = %error, "Failed to flush state manager");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes every registered manager and unregisters the ones that closed.
    ///
    /// Managers whose final flush failed stay registered with their pending
    /// writes. Every manager is attempted; the first failure is returned.
    pub async fn close_all(&self) -> Result<(), RunnerError> {
        let mut managers = self.managers.lock().await;
        let mut first_error = None;
        let mut closed = Vec::new();
        for (key, manager) in managers.iter() {
            match manager.close().await {
                Ok(()) => closed.push(key.clone()),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Failed to close state manager");
                    first_error.get_or_insert(error);
                }
            }
        }
        for key in closed {
            managers.remove(&key);
        }
        first_error.map_or(Ok(()), Err)
    }
}
