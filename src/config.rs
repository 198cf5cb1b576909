//! Process configuration for the runner.
//!
//! The deployer injects the state table name and ingest credentials as
//! environment variables. [`RunnerConfig`] captures them once at startup;
//! missing values only fail when the component that needs them is first used.

use std::fmt;

use crate::error::RunnerError;

/// Environment variable holding the DynamoDB state table name.
pub const DATASPRAY_STATE_TABLE_NAME_ENV: &str = "dataspray_state_table_name";
/// Environment variable holding the ingest API key.
pub const DATASPRAY_API_KEY_ENV: &str = "dataspray_api_key";
/// Environment variable holding the organization name.
pub const DATASPRAY_ORGANIZATION_NAME_ENV: &str = "dataspray_organization_name";
/// Environment variable overriding the ingest API endpoint.
pub const DATASPRAY_ENDPOINT_ENV: &str = "dataspray_endpoint";

/// Endpoint used when no override is configured.
pub const DEFAULT_ENDPOINT: &str = "https://api.dataspray.io";

/// Environment-sourced configuration, read once per process.
#[derive(Clone, Default)]
pub struct RunnerConfig {
    /// Name of the state table
    pub state_table_name: Option<String>,
    /// API key for the ingest API
    pub api_key: Option<String>,
    /// Organization the runner belongs to
    pub organization_name: Option<String>,
    /// Optional ingest endpoint override
    pub endpoint: Option<String>,
}

impl RunnerConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through a lookup function.
    ///
    /// Empty values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Self {
            state_table_name: read(DATASPRAY_STATE_TABLE_NAME_ENV),
            api_key: read(DATASPRAY_API_KEY_ENV),
            organization_name: read(DATASPRAY_ORGANIZATION_NAME_ENV),
            endpoint: read(DATASPRAY_ENDPOINT_ENV),
        }
    }

    /// Returns the state table name or a configuration error.
    pub fn state_table_name(&self) -> Result<&str, RunnerError> {
        self.state_table_name.as_deref().ok_or_else(|| {
            RunnerError::missing_variable("State table name", DATASPRAY_STATE_TABLE_NAME_ENV)
        })
    }

    /// Returns the ingest settings or a configuration error naming the first
    /// missing variable.
    pub fn ingest_config(&self) -> Result<IngestConfig, RunnerError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| RunnerError::missing_variable("DataSpray API key", DATASPRAY_API_KEY_ENV))?;
        let organization_name = self.organization_name.clone().ok_or_else(|| {
            RunnerError::missing_variable(
                "DataSpray organization name",
                DATASPRAY_ORGANIZATION_NAME_ENV,
            )
        })?;
        Ok(IngestConfig {
            api_key,
            organization_name,
            endpoint: self.endpoint.clone(),
        })
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("state_table_name", &self.state_table_name)
            .field("api_key", &self.api_key.is_some())
            .field("organization_name", &self.organization_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Settings for the ingest API client.
#[derive(Clone)]
pub struct IngestConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Organization the runner belongs to
    pub organization_name: String,
    /// Optional endpoint override
    pub endpoint: Option<String>,
}

impl IngestConfig {
    /// Returns the endpoint base URL without a trailing slash.
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("organization_name", &self.organization_name)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
