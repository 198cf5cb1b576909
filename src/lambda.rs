//! Lambda integration types for SQS-triggered processors.
//!
//! This module defines the SQS event the runtime delivers, the partial batch
//! response returned to it, and the routing metadata derived from each record.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::coordinator::StoreType;
use crate::error::RunnerError;

/// Pattern of the source queue name: `customer-{organization}-{stream}`.
static SQS_ARN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"customer-(?P<customer>[^-]+)-(?P<queue>.+)").expect("source ARN pattern is valid")
});

/// SQS attribute carrying the FIFO message group id.
pub const MESSAGE_GROUP_ID_ATTR: &str = "MessageGroupId";
/// SQS attribute carrying the FIFO deduplication id.
pub const MESSAGE_DEDUPLICATION_ID_ATTR: &str = "MessageDeduplicationId";

/// A batch of SQS records delivered to the function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SqsMessage>,
}

/// One SQS record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    /// Transport message id, reported back on failure
    pub message_id: String,

    #[serde(default)]
    pub receipt_handle: Option<String>,

    /// Opaque payload
    #[serde(default)]
    pub body: String,

    /// System attributes such as `MessageGroupId`
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    #[serde(default)]
    pub event_source: Option<String>,

    /// ARN of the source queue
    #[serde(rename = "eventSourceARN", default)]
    pub event_source_arn: String,

    #[serde(default)]
    pub aws_region: Option<String>,
}

impl SqsMessage {
    /// Returns the message group id used as the message key.
    pub fn message_group_id(&self) -> Option<&str> {
        self.attributes.get(MESSAGE_GROUP_ID_ATTR).map(String::as_str)
    }

    /// Returns the deduplication id used as the message id.
    pub fn message_deduplication_id(&self) -> Option<&str> {
        self.attributes
            .get(MESSAGE_DEDUPLICATION_ID_ATTR)
            .map(String::as_str)
    }
}

/// Partial batch response: only the listed records are redelivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl SqsBatchResponse {
    /// Returns the ids of failed records in batch order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Routing information handed to the processor with each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Kind of store the record came from
    pub store_type: StoreType,
    /// Organization parsed from the source queue
    pub store_name: String,
    /// Stream parsed from the source queue
    pub stream_name: String,
    /// Message key, if the record carried one
    pub key: Option<String>,
    /// Message id, if the record carried one
    pub id: Option<String>,
}

impl MessageMetadata {
    /// Derives metadata from a record, failing with a routing error if the
    /// source ARN does not name a customer queue.
    pub fn from_sqs_message(message: &SqsMessage) -> Result<Self, RunnerError> {
        let (store_name, stream_name) = parse_event_source(&message.event_source_arn)?;
        Ok(Self {
            store_type: StoreType::DataSpray,
            store_name,
            stream_name,
            key: message.message_group_id().map(str::to_string),
            id: message.message_deduplication_id().map(str::to_string),
        })
    }
}

/// Extracts `(organization, stream)` from a source queue ARN.
pub fn parse_event_source(arn: &str) -> Result<(String, String), RunnerError> {
    let captures = SQS_ARN_PATTERN
        .captures(arn)
        .ok_or_else(|| RunnerError::routing(arn))?;
    match (captures.name("customer"), captures.name("queue")) {
        (Some(customer), Some(queue)) => {
            Ok((customer.as_str().to_string(), queue.as_str().to_string()))
        }
        _ => Err(RunnerError::routing(arn)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sqs_event_deserialization() {
        let event: SqsEvent = serde_json::from_value(json!({
            "Records": [{
                "messageId": "059f36b4-87a3-44ab-83d2-661975830a7d",
                "receiptHandle": "AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a",
                "body": "{\"hello\":\"world\"}",
                "attributes": {
                    "ApproximateReceiveCount": "1",
                    "MessageGroupId": "user-42",
                    "MessageDeduplicationId": "dedup-1"
                },
                "messageAttributes": {},
                "md5OfBody": "e4e68fb7bd0e697a0ae8f1bb342846b3",
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:us-east-1:123456789012:customer-acme-orders",
                "awsRegion": "us-east-1"
            }]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 1);
        let record = &event.records[0];
        assert_eq!(record.message_id, "059f36b4-87a3-44ab-83d2-661975830a7d");
        assert_eq!(record.body, "{\"hello\":\"world\"}");
        assert_eq!(record.message_group_id(), Some("user-42"));
        assert_eq!(record.message_deduplication_id(), Some("dedup-1"));
        assert_eq!(record.aws_region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_batch_response_serialization() {
        let response = SqsBatchResponse {
            batch_item_failures: vec![BatchItemFailure {
                item_identifier: "msg-2".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"batchItemFailures": [{"itemIdentifier": "msg-2"}]})
        );
        assert_eq!(response.failed_ids(), vec!["msg-2"]);
    }

    #[test]
    fn test_empty_batch_response_serialization() {
        assert_eq!(
            serde_json::to_value(SqsBatchResponse::default()).unwrap(),
            json!({"batchItemFailures": []})
        );
    }

    #[test]
    fn test_parse_event_source() {
        let (customer, queue) =
            parse_event_source("arn:aws:sqs:us-east-1:123456789012:customer-acme-orders-eu").unwrap();
        assert_eq!(customer, "acme");
        assert_eq!(queue, "orders-eu");
    }

    #[test]
    fn test_parse_event_source_mismatch() {
        let err = parse_event_source("arn:aws:sqs:us-east-1:123456789012:orders").unwrap_err();
        assert!(err.is_routing());
    }

    #[test]
    fn test_metadata_without_group_id() {
        let message = SqsMessage {
            message_id: "m".to_string(),
            event_source_arn: "arn:aws:sqs:us-east-1:1:customer-acme-orders".to_string(),
            ..Default::default()
        };
        let metadata = MessageMetadata::from_sqs_message(&message).unwrap();
        assert_eq!(metadata.store_type, StoreType::DataSpray);
        assert_eq!(metadata.store_name, "acme");
        assert_eq!(metadata.stream_name, "orders");
        assert!(metadata.key.is_none());
        assert!(metadata.id.is_none());
    }
}
