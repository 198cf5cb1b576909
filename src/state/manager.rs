//! Buffered, TTL-aware client for one state item.
//!
//! A [`StateManager`] stages field mutations locally and sends them as a single
//! update on [`flush`](StateManager::flush). Reads flush first, so a caller
//! always observes its own writes. Staging a second mutation for a field that
//! already has one pending flushes the earlier one before staging.

use std::collections::HashSet;
use std::time::Duration;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use super::mutation::{Mutation, PendingMutations};
use crate::error::RunnerError;
use crate::key_codec::CompositeKey;
use crate::serdes::{JsonSerDes, SerDes, SerDesContext};
use crate::store::{Item, ItemKey, SharedStateStore, TTL_IN_EPOCH_SEC_KEY_NAME};

/// Mutable part of a manager, guarded by one lock.
#[derive(Debug, Default)]
struct ManagerState {
    pending: PendingMutations,
    /// Last known full item. `None` means it must be fetched before use.
    item: Option<Item>,
    closed: bool,
}

/// Per-key state client with deferred writes.
pub struct StateManager {
    key: CompositeKey,
    item_key: ItemKey,
    ttl: Option<Duration>,
    store: SharedStateStore,
    inner: Mutex<ManagerState>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl StateManager {
    /// Creates a manager for `key`.
    ///
    /// When `ttl` is set, every mutation also advances the item's expiry to
    /// now plus `ttl`.
    pub fn new(key: CompositeKey, ttl: Option<Duration>, store: SharedStateStore) -> Self {
        let item_key = ItemKey::for_state(&key);
        Self {
            key,
            item_key,
            ttl,
            store,
            inner: Mutex::new(ManagerState::default()),
        }
    }

    /// Returns the composite key this manager addresses.
    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    /// Returns the configured TTL window.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns true once [`close`](Self::close) has succeeded.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Stages an expiry update if a TTL window is configured.
    pub async fn touch(&self) -> Result<(), RunnerError> {
        let mut state = self.inner.lock().await;
        self.ensure_open(&state)?;
        self.touch_locked(&mut state);
        Ok(())
    }

    /// Returns the field as a string, or an empty string if absent or not a string.
    pub async fn get_string(&self, field: &str) -> Result<String, RunnerError> {
        Ok(match self.read_field(field).await? {
            Some(AttributeValue::S(value)) => value,
            _ => String::new(),
        })
    }

    /// Returns the field as a boolean, or `false` if absent or not a boolean.
    pub async fn get_boolean(&self, field: &str) -> Result<bool, RunnerError> {
        Ok(matches!(
            self.read_field(field).await?,
            Some(AttributeValue::Bool(true))
        ))
    }

    /// Returns the field as a number, or `0.0` if absent or not numeric.
    pub async fn get_number(&self, field: &str) -> Result<f64, RunnerError> {
        Ok(match self.read_field(field).await? {
            Some(AttributeValue::N(value)) => value.parse().unwrap_or(0.0),
            _ => 0.0,
        })
    }

    /// Returns the field as a string set, or an empty set if absent or not a set.
    pub async fn get_string_set(&self, field: &str) -> Result<HashSet<String>, RunnerError> {
        Ok(match self.read_field(field).await? {
            Some(AttributeValue::Ss(values)) => values.into_iter().collect(),
            _ => HashSet::new(),
        })
    }

    /// Reads a JSON-encoded field. An absent or empty field reads as `None`.
    pub async fn get_json<T>(&self, field: &str) -> Result<Option<T>, RunnerError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.get_with(field, &JsonSerDes::<T>::new()).await
    }

    /// Reads a field decoded through `serdes`.
    pub async fn get_with<T>(
        &self,
        field: &str,
        serdes: &dyn SerDes<T>,
    ) -> Result<Option<T>, RunnerError> {
        let data = self.get_string(field).await?;
        if data.is_empty() {
            return Ok(None);
        }
        let context = SerDesContext::new(self.item_key.partition_key.clone(), field);
        Ok(Some(serdes.deserialize(&data, &context)?))
    }

    /// Stages an assignment of a string value.
    pub async fn set_string(&self, field: &str, value: impl Into<String>) -> Result<(), RunnerError> {
        self.stage(field, Mutation::Set(AttributeValue::S(value.into())))
            .await
    }

    /// Stages an assignment of a boolean value.
    pub async fn set_boolean(&self, field: &str, value: bool) -> Result<(), RunnerError> {
        self.stage(field, Mutation::Set(AttributeValue::Bool(value)))
            .await
    }

    /// Stages an assignment of a number. Non-finite values fail with a validation error.
    pub async fn set_number(&self, field: &str, value: f64) -> Result<(), RunnerError> {
        let value = number_literal(field, value)?;
        self.stage(field, Mutation::Set(AttributeValue::N(value)))
            .await
    }

    /// Atomically adds `delta` to a numeric field on the store side, treating an
    /// absent field as zero.
    pub async fn add_to_number(&self, field: &str, delta: f64) -> Result<(), RunnerError> {
        let delta = number_literal(field, delta)?;
        self.stage(field, Mutation::Increment(delta)).await
    }

    /// Replaces a string set. An empty set removes the field.
    pub async fn set_string_set<I, S>(&self, field: &str, values: I) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = sorted_unique(values);
        let mutation = if values.is_empty() {
            Mutation::Remove
        } else {
            Mutation::Set(AttributeValue::Ss(values))
        };
        self.stage(field, mutation).await
    }

    /// Unions `values` into a string set on the store side.
    pub async fn add_to_string_set<I, S>(&self, field: &str, values: I) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = sorted_unique(values);
        if values.is_empty() {
            return self.check_open().await;
        }
        self.stage(field, Mutation::AddToSet(values)).await
    }

    /// Removes `values` from a string set on the store side.
    pub async fn delete_from_string_set<I, S>(
        &self,
        field: &str,
        values: I,
    ) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = sorted_unique(values);
        if values.is_empty() {
            return self.check_open().await;
        }
        self.stage(field, Mutation::DeleteFromSet(values)).await
    }

    /// Writes a field as JSON.
    pub async fn set_json<T>(&self, field: &str, value: &T) -> Result<(), RunnerError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.set_with(field, value, &JsonSerDes::<T>::new()).await
    }

    /// Writes a field encoded through `serdes`.
    pub async fn set_with<T>(
        &self,
        field: &str,
        value: &T,
        serdes: &dyn SerDes<T>,
    ) -> Result<(), RunnerError> {
        self.check_open().await?;
        let context = SerDesContext::new(self.item_key.partition_key.clone(), field);
        let data = serdes.serialize(value, &context)?;
        self.set_string(field, data).await
    }

    /// Stages removal of a field.
    pub async fn delete(&self, field: &str) -> Result<(), RunnerError> {
        self.stage(field, Mutation::Remove).await
    }

    /// Sends all pending mutations as one update.
    ///
    /// Does nothing when nothing is pending. On failure the pending set is kept.
    pub async fn flush(&self) -> Result<(), RunnerError> {
        let mut state = self.inner.lock().await;
        self.ensure_open(&state)?;
        self.flush_locked(&mut state).await
    }

    /// Flushes, then rejects all further operations. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), RunnerError> {
        let mut state = self.inner.lock().await;
        if state.closed {
            return Ok(());
        }
        self.flush_locked(&mut state).await?;
        state.closed = true;
        tracing::debug!(key = %self.key, "State manager closed");
        Ok(())
    }

    async fn check_open(&self) -> Result<(), RunnerError> {
        let state = self.inner.lock().await;
        self.ensure_open(&state)
    }

    fn ensure_open(&self, state: &ManagerState) -> Result<(), RunnerError> {
        if state.closed {
            return Err(RunnerError::closed(self.key.encoded()));
        }
        Ok(())
    }

    async fn read_field(&self, field: &str) -> Result<Option<AttributeValue>, RunnerError> {
        let mut state = self.inner.lock().await;
        self.ensure_open(&state)?;
        self.flush_locked(&mut state).await?;
        if state.item.is_none() {
            let item = self.store.get_item(&self.item_key).await?;
            state.item = Some(item.unwrap_or_default());
        }
        Ok(state.item.as_ref().and_then(|item| item.get(field)).cloned())
    }

    async fn stage(&self, field: &str, mutation: Mutation) -> Result<(), RunnerError> {
        let mut state = self.inner.lock().await;
        self.ensure_open(&state)?;
        if state.pending.contains(field) {
            tracing::debug!(key = %self.key, field, "Field already pending, flushing first");
            self.flush_locked(&mut state).await?;
        }
        state.item = None;
        self.touch_locked(&mut state);
        state.pending.stage(field, mutation);
        Ok(())
    }

    fn touch_locked(&self, state: &mut ManagerState) {
        if let Some(ttl) = self.ttl {
            let expiry = chrono::Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
            state.item = None;
            state.pending.stage(
                TTL_IN_EPOCH_SEC_KEY_NAME,
                Mutation::Set(AttributeValue::N(expiry.to_string())),
            );
        }
    }

    async fn flush_locked(&self, state: &mut ManagerState) -> Result<(), RunnerError> {
        if state.pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            key = %self.key,
            fields = state.pending.len(),
            "Flushing pending mutations"
        );
        let item = self.store.update_item(&self.item_key, &state.pending).await?;
        state.pending.clear();
        state.item = Some(item);
        Ok(())
    }
}

fn number_literal(field: &str, value: f64) -> Result<String, RunnerError> {
    if !value.is_finite() {
        return Err(RunnerError::validation(format!(
            "Field {} cannot hold non-finite number {}",
            field, value
        )));
    }
    Ok(value.to_string())
}

fn sorted_unique<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use std::sync::Arc;

    fn manager(ttl: Option<Duration>) -> (Arc<InMemoryStateStore>, StateManager) {
        let store = Arc::new(InMemoryStateStore::new());
        let key = CompositeKey::new(["someTask", "someMessageId"]).unwrap();
        (store.clone(), StateManager::new(key, ttl, store))
    }

    #[tokio::test]
    async fn test_flush_without_pending_is_noop() {
        let (store, manager) = manager(None);
        manager.flush().await.unwrap();
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_touch_without_ttl_stages_nothing() {
        let (store, manager) = manager(None);
        manager.touch().await.unwrap();
        manager.flush().await.unwrap();
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_expiry() {
        let (store, manager) = manager(Some(Duration::from_secs(u64::MAX)));
        manager.touch().await.unwrap();
        manager.flush().await.unwrap();

        let item = store.item(&manager.item_key).unwrap();
        assert_eq!(
            item.get(TTL_IN_EPOCH_SEC_KEY_NAME),
            Some(&AttributeValue::N(i64::MAX.to_string()))
        );
    }

    #[tokio::test]
    async fn test_read_after_flush_uses_update_response() {
        let (store, manager) = manager(None);
        manager.set_string("a", "x").await.unwrap();
        assert_eq!(manager.get_string("a").await.unwrap(), "x");
        assert_eq!(manager.get_string("a").await.unwrap(), "x");
        assert_eq!(store.update_count(), 1);
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_type_reads_as_zero_value() {
        let (_store, manager) = manager(None);
        manager.set_string("a", "not a number").await.unwrap();
        assert_eq!(manager.get_number("a").await.unwrap(), 0.0);
        assert!(!manager.get_boolean("a").await.unwrap());
        assert!(manager.get_string_set("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_number_rejected() {
        let (store, manager) = manager(None);
        let err = manager.set_number("n", f64::NAN).await.unwrap_err();
        assert!(matches!(err, RunnerError::Validation { .. }));
        let err = manager.add_to_number("n", f64::INFINITY).await.unwrap_err();
        assert!(matches!(err, RunnerError::Validation { .. }));
        manager.flush().await.unwrap();
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_string_set_removes_field() {
        let (store, manager) = manager(None);
        manager.set_string_set("ss", ["a"]).await.unwrap();
        manager.flush().await.unwrap();
        manager.set_string_set("ss", Vec::<String>::new()).await.unwrap();
        manager.flush().await.unwrap();

        let last = store.updates().pop().unwrap();
        assert_eq!(last.mutations.get("ss"), Some(&Mutation::Remove));
        assert!(manager.get_string_set("ss").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_without_values_is_noop() {
        let (store, manager) = manager(Some(Duration::from_secs(60)));
        manager.add_to_string_set("ss", Vec::<String>::new()).await.unwrap();
        manager.delete_from_string_set("ss", Vec::<String>::new()).await.unwrap();
        manager.flush().await.unwrap();
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (store, manager) = manager(None);
        manager.set_boolean("b", true).await.unwrap();
        manager.close().await.unwrap();
        manager.close().await.unwrap();
        assert!(manager.is_closed().await);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_close_keeps_manager_open() {
        let (store, manager) = manager(None);
        manager.set_boolean("b", true).await.unwrap();
        store.fail_next_update(RunnerError::store("unavailable"));

        assert!(manager.close().await.is_err());
        assert!(!manager.is_closed().await);

        manager.close().await.unwrap();
        assert!(manager.is_closed().await);
        assert_eq!(store.update_count(), 2);
    }
}
