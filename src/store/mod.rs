//! Wide-column store seam for state items.
//!
//! A state item lives at a fixed two-part address: the encoded composite key
//! as partition key and the constant [`STATE_SORT_KEY`] as sort key. The
//! [`StateStore`] trait abstracts the two calls the state manager needs, so the
//! DynamoDB backend and the in-memory backend are interchangeable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::RunnerError;
use crate::key_codec::CompositeKey;
use crate::state::PendingMutations;

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoStateStore;
pub use memory::{InMemoryStateStore, RecordedUpdate};

/// Partition key attribute name.
pub const PARTITION_KEY_ATTR: &str = "pk";
/// Sort key attribute name.
pub const SORT_KEY_ATTR: &str = "sk";
/// Sort key value shared by all state items.
pub const STATE_SORT_KEY: &str = "state";
/// Reserved field holding the absolute expiry instant in epoch seconds.
pub const TTL_IN_EPOCH_SEC_KEY_NAME: &str = "ttlInEpochSec";

/// A stored row: field name to typed value.
pub type Item = HashMap<String, AttributeValue>;

/// Two-part address of a state item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// Encoded composite key
    pub partition_key: String,
    /// Sort discriminator
    pub sort_key: String,
}

impl ItemKey {
    /// Returns the address of the state item for `key`.
    pub fn for_state(key: &CompositeKey) -> Self {
        Self {
            partition_key: key.encoded(),
            sort_key: STATE_SORT_KEY.to_string(),
        }
    }

    /// Returns the key attributes as they appear on a stored item.
    pub fn to_attributes(&self) -> Item {
        let mut attributes = Item::new();
        attributes.insert(
            PARTITION_KEY_ATTR.to_string(),
            AttributeValue::S(self.partition_key.clone()),
        );
        attributes.insert(
            SORT_KEY_ATTR.to_string(),
            AttributeValue::S(self.sort_key.clone()),
        );
        attributes
    }
}

/// Trait for reading and updating state items.
///
/// Implementations must not retry internally; failures are returned as
/// [`RunnerError::Store`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetches the full item at `key`, or `None` if it does not exist.
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, RunnerError>;

    /// Applies all `mutations` to the item at `key` in one request and returns
    /// the complete item as it is after the update.
    async fn update_item(
        &self,
        key: &ItemKey,
        mutations: &PendingMutations,
    ) -> Result<Item, RunnerError>;
}

/// Type alias for a shared StateStore.
pub type SharedStateStore = Arc<dyn StateStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_for_state() {
        let key = CompositeKey::new(["someTask", "someMessageId"]).unwrap();
        let item_key = ItemKey::for_state(&key);
        assert_eq!(item_key.partition_key, "someTask:someMessageId");
        assert_eq!(item_key.sort_key, STATE_SORT_KEY);
    }

    #[test]
    fn test_item_key_attributes() {
        let key = CompositeKey::new(["a"]).unwrap();
        let attributes = ItemKey::for_state(&key).to_attributes();
        assert_eq!(attributes.get(PARTITION_KEY_ATTR), Some(&AttributeValue::S("a".to_string())));
        assert_eq!(attributes.get(SORT_KEY_ATTR), Some(&AttributeValue::S("state".to_string())));
    }
}
