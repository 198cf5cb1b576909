//! Error types for the DataSpray runner.
//!
//! Every failure the runner can surface is a variant of [`RunnerError`].
//! Nothing in this crate retries on its own: store and ingest failures are
//! returned to the caller, and the batch entry point turns per-record errors
//! into partial batch failures so the queue redelivers only those records.

use thiserror::Error;

use crate::serdes::SerDesError;

/// Boxed error returned by user processing logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for the DataSpray runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Operation attempted on a state manager after `close()`.
    #[error("State manager for key {key} is already closed")]
    Closed {
        /// Encoded composite key of the closed manager
        key: String,
    },

    /// Required process configuration is missing.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing what is missing
        message: String,
        /// The environment variable that was expected, if any
        variable: Option<String>,
    },

    /// A fetch or update request against the state table failed.
    #[error("Store error: {message}")]
    Store {
        /// Error message describing what went wrong
        message: String,
        /// Whether the failure is transient (throttling, timeout)
        is_retriable: bool,
        /// Service error code if the store returned one
        code: Option<String>,
    },

    /// An inbound record's source identifier did not match the expected pattern.
    #[error("Routing error: {message}")]
    Routing {
        /// Error message describing the mismatch
        message: String,
        /// The source identifier that failed to parse
        source_identifier: String,
    },

    /// Forwarding a message to the ingest API failed.
    #[error("Failed to send message to DataSpray for organization {store_name} stream {stream_name}: {message}")]
    Forward {
        /// Underlying failure
        message: String,
        /// Destination store (organization) name
        store_name: String,
        /// Destination stream name
        stream_name: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    SerDes {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Validation error for invalid arguments or unsupported events.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure
        message: String,
    },

    /// The user's web handler failed or panicked.
    #[error("Web handler failed: {message}")]
    Handler {
        /// Error message returned by the handler
        message: String,
    },
}

impl RunnerError {
    /// Creates a new Closed error for the given encoded key.
    pub fn closed(key: impl Into<String>) -> Self {
        Self::Closed { key: key.into() }
    }

    /// Creates a new Configuration error naming a missing environment variable.
    pub fn missing_variable(description: &str, variable: &str) -> Self {
        Self::Configuration {
            message: format!("{} not found using env var {}", description, variable),
            variable: Some(variable.to_string()),
        }
    }

    /// Creates a new Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            variable: None,
        }
    }

    /// Creates a new non-retriable Store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            is_retriable: false,
            code: None,
        }
    }

    /// Creates a new retriable Store error.
    pub fn store_retriable(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            is_retriable: true,
            code: None,
        }
    }

    /// Creates a new Routing error.
    pub fn routing(source_identifier: impl Into<String>) -> Self {
        let source_identifier = source_identifier.into();
        Self::Routing {
            message: format!(
                "Failed to determine source queue from ARN {}",
                source_identifier
            ),
            source_identifier,
        }
    }

    /// Creates a new Forward error with destination context.
    pub fn forward(
        message: impl Into<String>,
        store_name: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Self {
        Self::Forward {
            message: message.into(),
            store_name: store_name.into(),
            stream_name: stream_name.into(),
        }
    }

    /// Creates a new SerDes error.
    pub fn serdes(message: impl Into<String>) -> Self {
        Self::SerDes {
            message: message.into(),
        }
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new Handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Returns true if this error came from using a closed state manager.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns true if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns true if this is a store error.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Returns true if this is a routing error.
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::Routing { .. })
    }

    /// Returns true if this is a forward error.
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }

    /// Returns true if the user's web handler failed.
    pub fn is_handler(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    /// Returns true if this is a Store error flagged as transient.
    ///
    /// The flag is informational. Retry is left to the message transport.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store { is_retriable: true, .. })
    }

    /// Returns the service error code of a Store error, if any.
    pub fn store_code(&self) -> Option<&str> {
        match self {
            Self::Store { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerDes {
            message: error.to_string(),
        }
    }
}

impl From<SerDesError> for RunnerError {
    fn from(error: SerDesError) -> Self {
        Self::SerDes {
            message: error.to_string(),
        }
    }
}
