//! Serialization/Deserialization for typed state fields.
//!
//! State fields are stored as plain strings; the [`SerDes`] trait converts
//! typed values to and from that representation. [`JsonSerDes`] is the default
//! and backs [`StateManager::get_json`](crate::StateManager::get_json) and
//! [`StateManager::set_json`](crate::StateManager::set_json).
//!
//! # Example
//!
//! ```rust
//! use dataspray_runner::serdes::{JsonSerDes, SerDes, SerDesContext};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Counter {
//!     hits: u32,
//! }
//!
//! let serdes = JsonSerDes::<Counter>::new();
//! let context = SerDesContext::new("task:msg-1", "counter");
//!
//! let serialized = serdes.serialize(&Counter { hits: 3 }, &context).unwrap();
//! let restored = serdes.deserialize(&serialized, &context).unwrap();
//! assert_eq!(restored, Counter { hits: 3 });
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

/// Error type for serialization/deserialization failures.
#[derive(Debug, Clone)]
pub struct SerDesError {
    /// The kind of error (serialization or deserialization)
    pub kind: SerDesErrorKind,
    /// Descriptive error message
    pub message: String,
}

/// The kind of SerDes error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerDesErrorKind {
    /// Error during serialization
    Serialization,
    /// Error during deserialization
    Deserialization,
}

impl SerDesError {
    /// Creates a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self {
            kind: SerDesErrorKind::Serialization,
            message: message.into(),
        }
    }

    /// Creates a new deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self {
            kind: SerDesErrorKind::Deserialization,
            message: message.into(),
        }
    }
}

impl fmt::Display for SerDesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SerDesErrorKind::Serialization => write!(f, "Serialization error: {}", self.message),
            SerDesErrorKind::Deserialization => {
                write!(f, "Deserialization error: {}", self.message)
            }
        }
    }
}

impl std::error::Error for SerDesError {}

/// Identifies the field being encoded or decoded.
#[derive(Debug, Clone)]
pub struct SerDesContext {
    /// The encoded composite key of the item holding the field
    pub state_key: String,
    /// The field name within the item
    pub field: String,
}

impl SerDesContext {
    /// Creates a new SerDesContext.
    pub fn new(state_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            state_key: state_key.into(),
            field: field.into(),
        }
    }
}

/// Trait for converting typed field values to and from their stored string form.
///
/// Implementations must be `Send + Sync` so they can be shared across tasks.
pub trait SerDes<T>: Send + Sync {
    /// Serializes a value to its stored string representation.
    fn serialize(&self, value: &T, context: &SerDesContext) -> Result<String, SerDesError>;

    /// Deserializes a stored string back into a value.
    fn deserialize(&self, data: &str, context: &SerDesContext) -> Result<T, SerDesError>;
}

/// Default JSON serialization using serde_json.
pub struct JsonSerDes<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerDes<T> {
    /// Creates a new JsonSerDes instance.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerDes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerDes<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerDes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSerDes").finish()
    }
}

impl<T> SerDes<T> for JsonSerDes<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T, context: &SerDesContext) -> Result<String, SerDesError> {
        serde_json::to_string(value).map_err(|e| {
            SerDesError::serialization(format!("field {}: {}", context.field, e))
        })
    }

    fn deserialize(&self, data: &str, context: &SerDesContext) -> Result<T, SerDesError> {
        serde_json::from_str(data).map_err(|e| {
            SerDesError::deserialization(format!("field {}: {}", context.field, e))
        })
    }
}
