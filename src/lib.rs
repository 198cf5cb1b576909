//! # DataSpray Runner for Lambda Rust Runtime
//!
//! Runtime support for DataSpray stream processors deployed as SQS-triggered
//! AWS Lambda functions.
//!
//! ## Overview
//!
//! A processor receives batches of SQS records. For each record the runner
//! derives routing metadata from the source queue, calls the user's
//! [`Processor`], and collects per-record failures into a partial batch
//! response so only the failed records are redelivered.
//!
//! Processors keep per-key state in a DynamoDB table through a
//! [`StateManager`]. A manager buffers field mutations and sends them as one
//! combined update when it is flushed, when a field is written twice, or when
//! the manager is read. Each write can advance a TTL on the item. All managers
//! are closed, and so flushed, at the end of every invocation.
//!
//! ### Key Features
//!
//! - **Coalesced writes**: any number of field mutations become one `UpdateItem`.
//! - **Read-your-writes**: reads flush pending mutations first.
//! - **Store-side arithmetic and sets**: increments and string-set changes are
//!   applied atomically by DynamoDB, not read-modify-write.
//! - **Partial batch failures**: one failing or panicking record never aborts
//!   the batch.
//! - **Function URLs**: the same function can answer HTTP requests through a
//!   [`WebProcessor`] registered with [`run_with_web`].
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use dataspray_runner::{BoxError, CompositeKey, MessageCoordinator, MessageMetadata, StoreType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     dataspray_runner::run(
//!         |metadata: MessageMetadata, data: String, coordinator: Arc<MessageCoordinator>| async move {
//!             let key = CompositeKey::new(["visits", metadata.key.as_deref().unwrap_or("anonymous")])?;
//!             let state = coordinator
//!                 .get_state_manager(key, Some(Duration::from_secs(86_400)))
//!                 .await?;
//!             state.add_to_number("count", 1.0).await?;
//!
//!             coordinator
//!                 .send("visits", data, StoreType::DataSpray, &metadata.store_name, "audit", None)
//!                 .await?;
//!             Ok::<(), BoxError>(())
//!         },
//!     )
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! | Variable | Used by |
//! |---|---|
//! | `dataspray_state_table_name` | state managers |
//! | `dataspray_api_key` | [`MessageCoordinator::send`] |
//! | `dataspray_organization_name` | [`MessageCoordinator::send`] |
//! | `dataspray_endpoint` | optional ingest endpoint override |
//!
//! Missing values fail on first use of the component that needs them.

pub mod config;
pub mod coordinator;
pub mod entrypoint;
pub mod error;
pub mod ingest;
pub mod key_codec;
pub mod lambda;
pub mod serdes;
pub mod state;
pub mod store;
pub mod web;

pub use config::{IngestConfig, RunnerConfig};
pub use coordinator::{MessageCoordinator, StoreType};
pub use entrypoint::{run, run_with_web, Entrypoint, Processor, RecordOutcome, WebProcessor};
pub use error::{BoxError, RunnerError};
pub use ingest::{HttpIngestClient, IngestClient, IngestMessage, SharedIngestClient};
pub use key_codec::CompositeKey;
pub use lambda::{BatchItemFailure, MessageMetadata, SqsBatchResponse, SqsEvent, SqsMessage};
pub use serdes::{JsonSerDes, SerDes, SerDesContext, SerDesError};
pub use state::{StateManager, StateManagerFactory};
pub use store::{
    DynamoStateStore, InMemoryStateStore, Item, ItemKey, SharedStateStore, StateStore,
};
pub use web::{FunctionUrlRequest, HttpRequest, HttpResponse};
