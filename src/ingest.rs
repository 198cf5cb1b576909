//! Client for the DataSpray ingest API.
//!
//! [`IngestClient`] is the seam the coordinator sends outbound messages
//! through. [`HttpIngestClient`] posts each message to
//! `{endpoint}/v1/organization/{organization}/stream/{stream}/message`,
//! authenticated with an `apikey` authorization header.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::IngestConfig;
use crate::error::RunnerError;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestMessage {
    /// Destination organization
    pub organization_name: String,
    /// Destination stream
    pub stream_name: String,
    /// Partitioning key of the message
    pub message_key: String,
    /// Optional deduplication id
    pub message_id: Option<String>,
    /// Raw message body
    pub payload: Vec<u8>,
}

/// Trait for submitting messages to the ingest API.
#[async_trait]
pub trait IngestClient: Send + Sync {
    /// Submits one message. Failures are returned as-is; nothing is retried.
    async fn send_message(&self, message: IngestMessage) -> Result<(), RunnerError>;
}

/// Type alias for a shared IngestClient.
pub type SharedIngestClient = Arc<dyn IngestClient>;

/// HTTP implementation of [`IngestClient`].
pub struct HttpIngestClient {
    http_client: reqwest::Client,
    config: IngestConfig,
}

impl std::fmt::Debug for HttpIngestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIngestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpIngestClient {
    /// Creates a client posting to the endpoint in `config`.
    pub fn new(config: IngestConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    /// Creates a client reusing an existing HTTP client.
    pub fn with_http_client(config: IngestConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Returns the organization the client was configured for.
    pub fn organization_name(&self) -> &str {
        &self.config.organization_name
    }

    /// Builds the request URL for `message`.
    pub fn message_url(&self, message: &IngestMessage) -> String {
        let mut url = format!(
            "{}/v1/organization/{}/stream/{}/message?messageKey={}",
            self.config.endpoint_url(),
            urlencoding::encode(&message.organization_name),
            urlencoding::encode(&message.stream_name),
            urlencoding::encode(&message.message_key),
        );
        if let Some(message_id) = &message.message_id {
            url.push_str("&messageId=");
            url.push_str(&urlencoding::encode(message_id));
        }
        url
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    async fn send_message(&self, message: IngestMessage) -> Result<(), RunnerError> {
        let url = self.message_url(&message);
        tracing::debug!(
            organization = %message.organization_name,
            stream = %message.stream_name,
            bytes = message.payload.len(),
            "Sending message to ingest API"
        );

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("apikey {}", self.config.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(message.payload)
            .send()
            .await
            .map_err(|e| {
                RunnerError::forward(
                    format!("HTTP request failed: {}", e),
                    &message.organization_name,
                    &message.stream_name,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::forward(
                format!("Ingest API returned {}: {}", status.as_u16(), body),
                &message.organization_name,
                &message.stream_name,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: Option<&str>) -> HttpIngestClient {
        HttpIngestClient::new(IngestConfig {
            api_key: "secret-token".to_string(),
            organization_name: "acme".to_string(),
            endpoint: endpoint.map(str::to_string),
        })
    }

    fn message(message_id: Option<&str>) -> IngestMessage {
        IngestMessage {
            organization_name: "acme".to_string(),
            stream_name: "orders eu".to_string(),
            message_key: "user/42".to_string(),
            message_id: message_id.map(str::to_string),
            payload: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_message_url_encodes_components() {
        let url = client(Some("http://localhost:9000/")).message_url(&message(None));
        assert_eq!(
            url,
            "http://localhost:9000/v1/organization/acme/stream/orders%20eu/message?messageKey=user%2F42"
        );
    }

    #[test]
    fn test_message_url_with_message_id() {
        let url = client(None).message_url(&message(Some("id-1")));
        assert!(url.starts_with("https://api.dataspray.io/v1/organization/acme/"));
        assert!(url.ends_with("&messageId=id-1"));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let debug = format!("{:?}", client(None));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("acme"));
    }
}
