//! Shared test utilities for integration tests.
//!
//! Provides a recording ingest client, SQS record builders, and a coordinator
//! wired to an in-memory state store.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dataspray_runner::error::RunnerError;
use dataspray_runner::ingest::{IngestClient, IngestMessage};
use dataspray_runner::lambda::{SqsEvent, SqsMessage};
use dataspray_runner::{InMemoryStateStore, MessageCoordinator, StateManagerFactory};

// =============================================================================
// Mock Ingest Client
// =============================================================================

/// An IngestClient that records every message and can be primed to fail.
#[derive(Default)]
pub struct RecordingIngestClient {
    sent: Mutex<Vec<IngestMessage>>,
    failures: Mutex<Vec<RunnerError>>,
}

impl RecordingIngestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next send fail with `error`.
    pub fn fail_next(&self, error: RunnerError) {
        self.failures.lock().unwrap().push(error);
    }

    /// Returns all messages sent so far.
    pub fn sent(&self) -> Vec<IngestMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestClient for RecordingIngestClient {
    async fn send_message(&self, message: IngestMessage) -> Result<(), RunnerError> {
        if let Some(error) = self.failures.lock().unwrap().pop() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const SOURCE_ARN: &str = "arn:aws:sqs:us-east-1:123456789012:customer-acme-orders";

/// Handles to everything a test may want to inspect.
pub struct Harness {
    pub store: Arc<InMemoryStateStore>,
    pub ingest: Arc<RecordingIngestClient>,
    pub factory: Arc<StateManagerFactory>,
    pub coordinator: Arc<MessageCoordinator>,
}

/// Builds a coordinator over an in-memory store and a recording ingest client.
pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStateStore::new());
    let ingest = Arc::new(RecordingIngestClient::new());
    let factory = Arc::new(StateManagerFactory::new(store.clone()));
    let coordinator = Arc::new(MessageCoordinator::with_components(
        factory.clone(),
        ingest.clone(),
    ));
    Harness {
        store,
        ingest,
        factory,
        coordinator,
    }
}

/// Builds an SQS record from the default customer queue.
pub fn sqs_message(message_id: &str, body: &str) -> SqsMessage {
    sqs_message_from(message_id, body, SOURCE_ARN)
}

/// Builds an SQS record with an explicit source ARN.
pub fn sqs_message_from(message_id: &str, body: &str, arn: &str) -> SqsMessage {
    let mut attributes = HashMap::new();
    attributes.insert("MessageGroupId".to_string(), format!("group-{}", message_id));
    attributes.insert(
        "MessageDeduplicationId".to_string(),
        format!("dedup-{}", message_id),
    );
    SqsMessage {
        message_id: message_id.to_string(),
        receipt_handle: Some(format!("receipt-{}", message_id)),
        body: body.to_string(),
        attributes,
        event_source: Some("aws:sqs".to_string()),
        event_source_arn: arn.to_string(),
        aws_region: Some("us-east-1".to_string()),
    }
}

pub fn sqs_event(records: Vec<SqsMessage>) -> SqsEvent {
    SqsEvent { records }
}
