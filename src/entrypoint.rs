//! Batch entry point for SQS-triggered processors.
//!
//! Records of a batch are processed strictly in order. A record whose routing
//! metadata cannot be derived, or whose processor call fails or panics, is
//! reported in the partial batch response; the remaining records are processed
//! regardless. Function URL requests go to an optional [`WebProcessor`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use dataspray_runner::{BoxError, CompositeKey, MessageCoordinator, MessageMetadata, Processor};
//!
//! struct CountByKey;
//!
//! #[async_trait]
//! impl Processor for CountByKey {
//!     async fn process(
//!         &self,
//!         metadata: MessageMetadata,
//!         _data: String,
//!         coordinator: Arc<MessageCoordinator>,
//!     ) -> Result<(), BoxError> {
//!         let key = CompositeKey::new([metadata.stream_name, metadata.key.unwrap_or_default()])?;
//!         let state = coordinator.get_state_manager(key, None).await?;
//!         state.add_to_number("count", 1.0).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     dataspray_runner::run(CountByKey).await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;

use crate::coordinator::MessageCoordinator;
use crate::error::{BoxError, RunnerError};
use crate::lambda::{BatchItemFailure, MessageMetadata, SqsBatchResponse, SqsEvent, SqsMessage};
use crate::web::{FunctionUrlRequest, HttpRequest, HttpResponse};

/// User processing logic invoked once per record.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        metadata: MessageMetadata,
        data: String,
        coordinator: Arc<MessageCoordinator>,
    ) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> Processor for F
where
    F: Fn(MessageMetadata, String, Arc<MessageCoordinator>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn process(
        &self,
        metadata: MessageMetadata,
        data: String,
        coordinator: Arc<MessageCoordinator>,
    ) -> Result<(), BoxError> {
        (self)(metadata, data, coordinator).await
    }
}

/// User logic answering function URL requests.
#[async_trait]
pub trait WebProcessor: Send + Sync {
    async fn web(
        &self,
        request: HttpRequest,
        coordinator: Arc<MessageCoordinator>,
    ) -> Result<HttpResponse, BoxError>;
}

#[async_trait]
impl<F, Fut> WebProcessor for F
where
    F: Fn(HttpRequest, Arc<MessageCoordinator>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, BoxError>> + Send + 'static,
{
    async fn web(
        &self,
        request: HttpRequest,
        coordinator: Arc<MessageCoordinator>,
    ) -> Result<HttpResponse, BoxError> {
        (self)(request, coordinator).await
    }
}

/// Result of processing one record.
#[derive(Debug)]
pub enum RecordOutcome {
    Succeeded {
        message_id: String,
    },
    Failed {
        message_id: String,
        error: BoxError,
    },
}

impl RecordOutcome {
    /// Returns the transport message id of the record.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Succeeded { message_id } | Self::Failed { message_id, .. } => message_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Drives a [`Processor`] over inbound batches, and optionally a
/// [`WebProcessor`] over function URL requests.
pub struct Entrypoint<P> {
    processor: Arc<P>,
    web: Option<Arc<dyn WebProcessor>>,
    coordinator: Arc<MessageCoordinator>,
}

impl<P: Processor + 'static> Entrypoint<P> {
    pub fn new(processor: P, coordinator: Arc<MessageCoordinator>) -> Self {
        Self {
            processor: Arc::new(processor),
            web: None,
            coordinator,
        }
    }

    /// Creates an entry point whose coordinator reads the process environment.
    pub fn from_env(processor: P) -> Self {
        Self::new(processor, Arc::new(MessageCoordinator::from_env()))
    }

    /// Registers the handler for function URL requests.
    pub fn with_web_processor(mut self, web: impl WebProcessor + 'static) -> Self {
        self.web = Some(Arc::new(web));
        self
    }

    pub fn coordinator(&self) -> &Arc<MessageCoordinator> {
        &self.coordinator
    }

    /// Processes one record. Never fails; failures are captured in the outcome.
    ///
    /// The processor runs on its own task, so a panic fails only this record.
    pub async fn process_record(&self, message: &SqsMessage) -> RecordOutcome {
        let message_id = message.message_id.clone();
        let metadata = match MessageMetadata::from_sqs_message(message) {
            Ok(metadata) => metadata,
            Err(error) => {
                return RecordOutcome::Failed {
                    message_id,
                    error: error.into(),
                }
            }
        };

        let processor = self.processor.clone();
        let coordinator = self.coordinator.clone();
        let data = message.body.clone();
        let task =
            tokio::spawn(async move { processor.process(metadata, data, coordinator).await });

        match task.await {
            Ok(Ok(())) => RecordOutcome::Succeeded { message_id },
            Ok(Err(error)) => RecordOutcome::Failed { message_id, error },
            Err(join_error) => RecordOutcome::Failed {
                message_id,
                error: format!("Processor panicked: {}", join_error).into(),
            },
        }
    }

    /// Processes every record in order and returns one outcome per record.
    pub async fn process_batch(&self, event: &SqsEvent) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(event.records.len());
        for message in &event.records {
            outcomes.push(self.process_record(message).await);
        }
        outcomes
    }

    /// Processes a batch and reports the records that failed.
    pub async fn handle_sqs_event(&self, event: &SqsEvent) -> SqsBatchResponse {
        let outcomes = self.process_batch(event).await;
        let mut response = SqsBatchResponse::default();
        for outcome in outcomes {
            if let RecordOutcome::Failed { message_id, error } = outcome {
                tracing::warn!(message_id = %message_id, error = %error, "Failed to process message");
                response.batch_item_failures.push(BatchItemFailure {
                    item_identifier: message_id,
                });
            }
        }
        tracing::debug!(
            records = event.records.len(),
            failures = response.batch_item_failures.len(),
            "Processed SQS batch"
        );
        response
    }

    /// Answers a function URL request with the registered web processor.
    ///
    /// Fails with a validation error if none is registered, and with
    /// [`RunnerError::Handler`] if the handler fails or panics.
    pub async fn handle_http_request(
        &self,
        event: FunctionUrlRequest,
    ) -> Result<HttpResponse, RunnerError> {
        let web = self.web.clone().ok_or_else(|| {
            RunnerError::validation(format!(
                "No web processor registered for request to {}",
                event.raw_path
            ))
        })?;

        let request = HttpRequest::new(event);
        let method = request.method().to_string();
        let path = request.raw_path().to_string();
        let user_agent = request
            .event()
            .request_context
            .http
            .user_agent
            .clone()
            .unwrap_or_default();

        let coordinator = self.coordinator.clone();
        let response = match tokio::spawn(async move { web.web(request, coordinator).await }).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Err(RunnerError::handler(error.to_string())),
            Err(join_error) => return Err(RunnerError::handler(join_error.to_string())),
        };

        tracing::info!(
            method = %method,
            path = %path,
            status = response.status_code,
            body_len = response.body.len(),
            user_agent = %user_agent,
            "Handled HTTP request"
        );
        Ok(response)
    }

    /// Handles one raw Lambda invocation.
    ///
    /// SQS batches are recognised by their `Records` field and function URL
    /// requests by `rawPath`; anything else is rejected. All state managers are
    /// closed before returning, and a failure to close fails the invocation so
    /// the batch is redelivered.
    pub async fn handle_request(&self, payload: Value) -> Result<Value, RunnerError> {
        let result = self.dispatch(payload).await;
        let closed = self.coordinator.close_all().await;
        match (result, closed) {
            (Ok(response), Ok(())) => Ok(response),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(close_error)) => {
                tracing::warn!(error = %close_error, "Failed to close state managers");
                Err(error)
            }
        }
    }

    async fn dispatch(&self, payload: Value) -> Result<Value, RunnerError> {
        if payload.get("Records").is_some() {
            let event: SqsEvent = serde_json::from_value(payload)?;
            let response = self.handle_sqs_event(&event).await;
            Ok(serde_json::to_value(response)?)
        } else if payload.get("rawPath").is_some() {
            let event: FunctionUrlRequest = serde_json::from_value(payload)?;
            let response = self.handle_http_request(event).await?;
            Ok(serde_json::to_value(response)?)
        } else {
            Err(RunnerError::validation(format!(
                "Unsupported event: {}",
                payload
            )))
        }
    }
}

/// Runs `processor` as a Lambda function until the runtime shuts down.
pub async fn run<P>(processor: P) -> Result<(), lambda_runtime::Error>
where
    P: Processor + 'static,
{
    serve(Entrypoint::from_env(processor)).await
}

/// Runs `processor` for SQS batches and `web` for function URL requests.
pub async fn run_with_web<P, W>(processor: P, web: W) -> Result<(), lambda_runtime::Error>
where
    P: Processor + 'static,
    W: WebProcessor + 'static,
{
    serve(Entrypoint::from_env(processor).with_web_processor(web)).await
}

async fn serve<P>(entrypoint: Entrypoint<P>) -> Result<(), lambda_runtime::Error>
where
    P: Processor + 'static,
{
    lambda_runtime::tracing::init_default_subscriber();

    let entrypoint = Arc::new(entrypoint);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let entrypoint = entrypoint.clone();
        async move {
            entrypoint
                .handle_request(event.payload)
                .await
                .map_err(lambda_runtime::Error::from)
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;

    fn message(message_id: &str, arn: &str) -> SqsMessage {
        SqsMessage {
            message_id: message_id.to_string(),
            body: "{}".to_string(),
            event_source_arn: arn.to_string(),
            ..Default::default()
        }
    }

    fn entrypoint<P: Processor + 'static>(processor: P) -> Entrypoint<P> {
        Entrypoint::new(processor, Arc::new(MessageCoordinator::new(RunnerConfig::default())))
    }

    #[tokio::test]
    async fn test_closure_processor() {
        let entrypoint = entrypoint(
            |metadata: MessageMetadata, data: String, _coordinator: Arc<MessageCoordinator>| async move {
                if metadata.stream_name == "bad" || data.is_empty() {
                    return Err::<(), BoxError>("rejected".into());
                }
                Ok(())
            },
        );

        let ok = entrypoint
            .process_record(&message("1", "arn:aws:sqs:us-east-1:1:customer-acme-good"))
            .await;
        assert!(!ok.is_failed());
        assert_eq!(ok.message_id(), "1");

        let failed = entrypoint
            .process_record(&message("2", "arn:aws:sqs:us-east-1:1:customer-acme-bad"))
            .await;
        assert!(failed.is_failed());
    }

    #[tokio::test]
    async fn test_unsupported_event_rejected() {
        let entrypoint = entrypoint(
            |_: MessageMetadata, _: String, _: Arc<MessageCoordinator>| async move {
                Ok::<(), BoxError>(())
            },
        );
        let err = entrypoint
            .handle_request(serde_json::json!({"detail-type": "Scheduled Event"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_function_url_without_web_processor_rejected() {
        let entrypoint = entrypoint(
            |_: MessageMetadata, _: String, _: Arc<MessageCoordinator>| async move {
                Ok::<(), BoxError>(())
            },
        );
        let err = entrypoint
            .handle_request(serde_json::json!({"rawPath": "/"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Validation { .. }));
        assert!(err.to_string().contains("No web processor"));
    }

    #[tokio::test]
    async fn test_closure_web_processor() {
        let entrypoint = entrypoint(
            |_: MessageMetadata, _: String, _: Arc<MessageCoordinator>| async move {
                Ok::<(), BoxError>(())
            },
        )
        .with_web_processor(
            |request: HttpRequest, _coordinator: Arc<MessageCoordinator>| async move {
                Ok::<_, BoxError>(HttpResponse::ok(format!("{} {}", request.method(), request.raw_path())))
            },
        );

        let response = entrypoint
            .handle_http_request(FunctionUrlRequest {
                raw_path: "/ping".to_string(),
                request_context: crate::web::FunctionUrlRequestContext {
                    http: crate::web::HttpDescription {
                        method: "GET".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "GET /ping");
    }
}
