//! DynamoDB-backed state store.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;

use super::{Item, ItemKey, StateStore, PARTITION_KEY_ATTR, SORT_KEY_ATTR};
use crate::error::RunnerError;
use crate::state::PendingMutations;

/// Service error codes that indicate a transient failure.
const RETRIABLE_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
];

/// State store backed by one DynamoDB table with `pk`/`sk` string keys.
#[derive(Clone)]
pub struct DynamoStateStore {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoStateStore")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl DynamoStateStore {
    /// Creates a store for `table_name` using an existing client.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a store from AWS SDK config.
    pub fn from_aws_config(aws_config: &aws_config::SdkConfig, table_name: impl Into<String>) -> Self {
        Self::new(Client::new(aws_config), table_name)
    }

    /// Creates a store using the default AWS credential and region chain.
    pub async fn from_env(table_name: impl Into<String>) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::from_aws_config(&aws_config, table_name)
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the underlying DynamoDB client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn store_error<E, R>(operation: &str, key: &ItemKey, error: SdkError<E, R>) -> RunnerError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = error.code().map(str::to_string);
    let transport_failure = matches!(
        error,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    );
    let is_retriable = transport_failure
        || code
            .as_deref()
            .map(|c| RETRIABLE_CODES.contains(&c))
            .unwrap_or(false);
    let detail = error
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());

    RunnerError::Store {
        message: format!(
            "{} failed for partitionKey {}: {}",
            operation, key.partition_key, detail
        ),
        is_retriable,
        code,
    }
}

#[async_trait]
impl StateStore for DynamoStateStore {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, RunnerError> {
        tracing::info!(
            table = %self.table_name,
            partition_key = %key.partition_key,
            sort_key = %key.sort_key,
            "Fetching dynamo item"
        );
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PARTITION_KEY_ATTR, AttributeValue::S(key.partition_key.clone()))
            .key(SORT_KEY_ATTR, AttributeValue::S(key.sort_key.clone()))
            .send()
            .await
            .map_err(|e| store_error("GetItem", key, e))?;

        Ok(output.item().cloned())
    }

    async fn update_item(
        &self,
        key: &ItemKey,
        mutations: &PendingMutations,
    ) -> Result<Item, RunnerError> {
        let update = mutations.to_update_expression();
        tracing::info!(
            table = %self.table_name,
            partition_key = %key.partition_key,
            fields = mutations.len(),
            "Flushing dynamo update"
        );
        tracing::debug!(expression = %update.expression, "Update expression");
        let values = update.attribute_values();

        let output = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(PARTITION_KEY_ATTR, AttributeValue::S(key.partition_key.clone()))
            .key(SORT_KEY_ATTR, AttributeValue::S(key.sort_key.clone()))
            .update_expression(update.expression)
            .set_expression_attribute_names(Some(update.names))
            .set_expression_attribute_values(values)
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| store_error("UpdateItem", key, e))?;

        Ok(output.attributes().cloned().unwrap_or_default())
    }
}
