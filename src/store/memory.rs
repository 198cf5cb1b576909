//! In-process state store.
//!
//! Applies the same mutation kinds as the DynamoDB backend against a local map,
//! following DynamoDB's semantics for increments and string sets. It records
//! every update request and counts fetches, which makes it the test double for
//! anything built on [`StateStore`].

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use super::{Item, ItemKey, StateStore};
use crate::error::RunnerError;
use crate::state::{Mutation, PendingMutations, UpdateExpression};

/// Record of an update call for test verification.
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub key: ItemKey,
    pub mutations: PendingMutations,
}

/// State store holding items in memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    items: Mutex<HashMap<ItemKey, Item>>,
    updates: Mutex<Vec<RecordedUpdate>>,
    get_count: AtomicUsize,
    update_failures: Mutex<VecDeque<RunnerError>>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next update call fail with `error` without applying anything.
    pub fn fail_next_update(&self, error: RunnerError) {
        lock(&self.update_failures).push_back(error);
    }

    /// Inserts or replaces an item directly.
    pub fn put_item(&self, key: ItemKey, item: Item) {
        lock(&self.items).insert(key, item);
    }

    /// Returns a copy of the stored item at `key`.
    pub fn item(&self, key: &ItemKey) -> Option<Item> {
        lock(&self.items).get(key).cloned()
    }

    /// Returns all successful and failed update calls in order.
    pub fn updates(&self) -> Vec<RecordedUpdate> {
        lock(&self.updates).clone()
    }

    /// Returns the number of update calls.
    pub fn update_count(&self) -> usize {
        lock(&self.updates).len()
    }

    /// Returns the number of fetch calls.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, RunnerError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.items).get(key).cloned())
    }

    async fn update_item(
        &self,
        key: &ItemKey,
        mutations: &PendingMutations,
    ) -> Result<Item, RunnerError> {
        lock(&self.updates).push(RecordedUpdate {
            key: key.clone(),
            mutations: mutations.clone(),
        });
        if let Some(error) = lock(&self.update_failures).pop_front() {
            return Err(error);
        }
        validate_request(&mutations.to_update_expression())?;

        let mut items = lock(&self.items);
        let item = items.entry(key.clone()).or_insert_with(|| key.to_attributes());
        for (field, mutation) in mutations.iter() {
            apply(item, field, mutation)?;
        }
        Ok(item.clone())
    }
}

fn apply(item: &mut Item, field: &str, mutation: &Mutation) -> Result<(), RunnerError> {
    match mutation {
        Mutation::Set(value) => {
            item.insert(field.to_string(), value.clone());
        }
        Mutation::Increment(delta) => {
            let current = match item.get(field) {
                Some(AttributeValue::N(n)) => parse_number(field, n)?,
                Some(_) => {
                    return Err(RunnerError::store(format!(
                        "An operand in the update expression has an incorrect data type: {}",
                        field
                    )))
                }
                None => 0.0,
            };
            let sum = current + parse_number(field, delta)?;
            item.insert(field.to_string(), AttributeValue::N(sum.to_string()));
        }
        Mutation::Remove => {
            item.remove(field);
        }
        Mutation::AddToSet(values) => {
            let mut set = string_set(item, field)?;
            set.extend(values.iter().cloned());
            item.insert(field.to_string(), AttributeValue::Ss(set.into_iter().collect()));
        }
        Mutation::DeleteFromSet(values) => {
            let mut set = string_set(item, field)?;
            for value in values {
                set.remove(value);
            }
            if set.is_empty() {
                item.remove(field);
            } else {
                item.insert(field.to_string(), AttributeValue::Ss(set.into_iter().collect()));
            }
        }
    }
    Ok(())
}

/// Rejects requests the service would refuse before touching the item.
fn validate_request(update: &UpdateExpression) -> Result<(), RunnerError> {
    if update.expression.is_empty() {
        return Err(RunnerError::store("Invalid UpdateExpression: expression is empty"));
    }
    if matches!(update.attribute_values(), Some(values) if values.is_empty()) {
        return Err(RunnerError::store("ExpressionAttributeValues must not be empty"));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_number(field: &str, n: &str) -> Result<f64, RunnerError> {
    n.parse()
        .map_err(|_| RunnerError::store(format!("Invalid number {} for field {}", n, field)))
}

fn string_set(item: &Item, field: &str) -> Result<BTreeSet<String>, RunnerError> {
    match item.get(field) {
        Some(AttributeValue::Ss(values)) => Ok(values.iter().cloned().collect()),
        Some(_) => Err(RunnerError::store(format!(
            "An operand in the update expression has an incorrect data type: {}",
            field
        ))),
        None => Ok(BTreeSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_codec::CompositeKey;

    fn key() -> ItemKey {
        ItemKey::for_state(&CompositeKey::new(["task", "msg"]).unwrap())
    }

    fn n(value: &str) -> AttributeValue {
        AttributeValue::N(value.to_string())
    }

    #[tokio::test]
    async fn test_missing_item() {
        let store = InMemoryStateStore::new();
        assert!(store.get_item(&key()).await.unwrap().is_none());
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn test_update_creates_item_with_key_attributes() {
        let store = InMemoryStateStore::new();
        let mut pending = PendingMutations::new();
        pending.stage("a", Mutation::Set(AttributeValue::S("x".to_string())));

        let item = store.update_item(&key(), &pending).await.unwrap();
        assert_eq!(item.get("a"), Some(&AttributeValue::S("x".to_string())));
        assert_eq!(item.get("pk"), Some(&AttributeValue::S("task:msg".to_string())));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_increment_defaults_to_zero() {
        let store = InMemoryStateStore::new();
        let mut pending = PendingMutations::new();
        pending.stage("n1", Mutation::Increment("1".to_string()));
        pending.stage("n2", Mutation::Set(n("0.1")));
        store.update_item(&key(), &pending).await.unwrap();

        let mut pending = PendingMutations::new();
        pending.stage("n2", Mutation::Increment("1".to_string()));
        let item = store.update_item(&key(), &pending).await.unwrap();

        assert_eq!(item.get("n1"), Some(&n("1")));
        assert_eq!(item.get("n2"), Some(&n("1.1")));
    }

    #[tokio::test]
    async fn test_set_union_and_difference() {
        let store = InMemoryStateStore::new();
        let mut pending = PendingMutations::new();
        pending.stage("ss", Mutation::AddToSet(vec!["b".to_string(), "a".to_string()]));
        store.update_item(&key(), &pending).await.unwrap();

        let mut pending = PendingMutations::new();
        pending.stage("ss", Mutation::DeleteFromSet(vec!["a".to_string()]));
        let item = store.update_item(&key(), &pending).await.unwrap();
        assert_eq!(item.get("ss"), Some(&AttributeValue::Ss(vec!["b".to_string()])));

        let mut pending = PendingMutations::new();
        pending.stage("ss", Mutation::DeleteFromSet(vec!["b".to_string()]));
        let item = store.update_item(&key(), &pending).await.unwrap();
        assert!(!item.contains_key("ss"));
    }

    #[tokio::test]
    async fn test_increment_on_string_fails() {
        let store = InMemoryStateStore::new();
        let mut pending = PendingMutations::new();
        pending.stage("s", Mutation::Set(AttributeValue::S("x".to_string())));
        store.update_item(&key(), &pending).await.unwrap();

        let mut pending = PendingMutations::new();
        pending.stage("s", Mutation::Increment("1".to_string()));
        let err = store.update_item(&key(), &pending).await.unwrap_err();
        assert!(err.is_store());
    }

    #[tokio::test]
    async fn test_remove_only_update() {
        let store = InMemoryStateStore::new();
        let mut pending = PendingMutations::new();
        pending.stage("a", Mutation::Set(AttributeValue::S("x".to_string())));
        store.update_item(&key(), &pending).await.unwrap();

        let mut pending = PendingMutations::new();
        pending.stage("a", Mutation::Remove);
        let item = store.update_item(&key(), &pending).await.unwrap();
        assert!(!item.contains_key("a"));
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let store = InMemoryStateStore::new();
        let err = store
            .update_item(&key(), &PendingMutations::new())
            .await
            .unwrap_err();
        assert!(err.is_store());
        assert!(store.item(&key()).is_none());
    }

    #[tokio::test]
    async fn test_fail_next_update() {
        let store = InMemoryStateStore::new();
        store.fail_next_update(RunnerError::store_retriable("throttled"));

        let mut pending = PendingMutations::new();
        pending.stage("a", Mutation::Remove);
        let err = store.update_item(&key(), &pending).await.unwrap_err();
        assert!(err.is_retriable());
        assert!(store.item(&key()).is_none());

        assert!(store.update_item(&key(), &pending).await.is_ok());
        assert_eq!(store.update_count(), 2);
    }
}
