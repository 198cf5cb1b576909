//! Per-invocation facade handed to processing logic.
//!
//! [`MessageCoordinator`] forwards outbound messages to the ingest API and
//! vends state managers. Both backing clients are built lazily from
//! [`RunnerConfig`] on first use, so a processor that never sends or never
//! touches state does not need the corresponding configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::ingest::{HttpIngestClient, IngestMessage, SharedIngestClient};
use crate::key_codec::CompositeKey;
use crate::state::{StateManager, StateManagerFactory};

/// Kind of store a message is sent to or received from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreType {
    #[serde(rename = "DATASPRAY")]
    DataSpray,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataSpray => write!(f, "DATASPRAY"),
        }
    }
}

/// Routes outbound messages and hands out state managers.
pub struct MessageCoordinator {
    config: RunnerConfig,
    factory: OnceCell<Arc<StateManagerFactory>>,
    ingest: OnceCell<SharedIngestClient>,
}

impl fmt::Debug for MessageCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCoordinator")
            .field("config", &self.config)
            .field("factory_initialized", &self.factory.initialized())
            .field("ingest_initialized", &self.ingest.initialized())
            .finish()
    }
}

impl MessageCoordinator {
    /// Creates a coordinator that builds its clients from `config` on demand.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            factory: OnceCell::new(),
            ingest: OnceCell::new(),
        }
    }

    /// Creates a coordinator from the process environment.
    pub fn from_env() -> Self {
        Self::new(RunnerConfig::from_env())
    }

    /// Creates a coordinator around prebuilt clients.
    pub fn with_components(factory: Arc<StateManagerFactory>, ingest: SharedIngestClient) -> Self {
        Self {
            config: RunnerConfig::default(),
            factory: OnceCell::from(factory),
            ingest: OnceCell::from(ingest),
        }
    }

    /// Returns the configuration the coordinator was built with.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Sends `payload` to the stream `stream_name` of `store_name`.
    ///
    /// Missing ingest configuration fails with [`RunnerError::Configuration`];
    /// any other failure is returned as [`RunnerError::Forward`] naming the
    /// destination.
    pub async fn send(
        &self,
        key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        store_type: StoreType,
        store_name: &str,
        stream_name: &str,
        message_id: Option<&str>,
    ) -> Result<(), RunnerError> {
        match store_type {
            StoreType::DataSpray => {
                let message = IngestMessage {
                    organization_name: store_name.to_string(),
                    stream_name: stream_name.to_string(),
                    message_key: key.into(),
                    message_id: message_id.map(str::to_string),
                    payload: payload.into(),
                };
                let result = match self.ingest_client().await {
                    Ok(client) => client.send_message(message).await,
                    Err(error) => Err(error),
                };
                result.map_err(|error| {
                    tracing::error!(
                        store_name,
                        stream_name,
                        error = %error,
                        "Failed to send message to DataSpray"
                    );
                    match error {
                        RunnerError::Forward { .. } | RunnerError::Configuration { .. } => error,
                        other => RunnerError::forward(other.to_string(), store_name, stream_name),
                    }
                })
            }
        }
    }

    /// Returns the state manager for `key`.
    pub async fn get_state_manager(
        &self,
        key: CompositeKey,
        ttl: Option<Duration>,
    ) -> Result<Arc<StateManager>, RunnerError> {
        let factory = self.state_manager_factory().await?;
        Ok(factory.state_manager(key, ttl).await)
    }

    /// Returns the state manager factory, creating it on first use.
    pub async fn state_manager_factory(&self) -> Result<&Arc<StateManagerFactory>, RunnerError> {
        self.factory
            .get_or_try_init(|| async {
                StateManagerFactory::from_config(&self.config)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Flushes all state managers. Does nothing if none were requested.
    pub async fn flush_all(&self) -> Result<(), RunnerError> {
        match self.factory.get() {
            Some(factory) => factory.flush_all().await,
            None => Ok(()),
        }
    }

    /// Closes all state managers. Does nothing if none were requested.
    pub async fn close_all(&self) -> Result<(), RunnerError> {
        match self.factory.get() {
            Some(factory) => factory.close_all().await,
            None => Ok(()),
        }
    }

    async fn ingest_client(&self) -> Result<&SharedIngestClient, RunnerError> {
        self.ingest
            .get_or_try_init(|| async {
                let config = self.config.ingest_config()?;
                let client: SharedIngestClient = Arc::new(HttpIngestClient::new(config));
                Ok::<_, RunnerError>(client)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DATASPRAY_API_KEY_ENV, DATASPRAY_ORGANIZATION_NAME_ENV};

    #[test]
    fn test_store_type_display_and_serde() {
        assert_eq!(StoreType::DataSpray.to_string(), "DATASPRAY");
        assert_eq!(
            serde_json::to_string(&StoreType::DataSpray).unwrap(),
            "\"DATASPRAY\""
        );
    }

    #[tokio::test]
    async fn test_send_without_api_key_fails_fast() {
        let coordinator = MessageCoordinator::new(RunnerConfig::from_lookup(|name| {
            (name == DATASPRAY_ORGANIZATION_NAME_ENV).then(|| "acme".to_string())
        }));
        let err = coordinator
            .send("k", "payload", StoreType::DataSpray, "acme", "orders", None)
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains(DATASPRAY_API_KEY_ENV));
    }

    #[tokio::test]
    async fn test_state_manager_without_table_fails() {
        let coordinator = MessageCoordinator::new(RunnerConfig::default());
        let key = CompositeKey::new(["a"]).unwrap();
        let err = coordinator.get_state_manager(key, None).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_close_all_before_first_use_is_noop() {
        let coordinator = MessageCoordinator::new(RunnerConfig::default());
        coordinator.flush_all().await.unwrap();
        coordinator.close_all().await.unwrap();
    }
}
