//! Lambda function URL invocations.
//!
//! A function URL delivers an HTTP request as a JSON payload recognised by its
//! `rawPath` field. [`HttpRequest`] wraps that payload with convenience
//! accessors, and [`HttpResponse`] is what a web handler returns.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Payload of a function URL invocation (format version 2.0).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUrlRequest {
    #[serde(default)]
    pub version: Option<String>,

    /// Request path, e.g. `/example/test/demo`
    pub raw_path: String,

    #[serde(default)]
    pub raw_query_string: String,

    /// Cookies in `name=value` form
    #[serde(default)]
    pub cookies: Option<Vec<String>>,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,

    #[serde(default)]
    pub request_context: FunctionUrlRequestContext,

    /// Request body, base64-encoded if binary
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub is_base64_encoded: bool,
}

/// Invocation context of a function URL request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUrlRequestContext {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub time_epoch: Option<i64>,
    #[serde(default)]
    pub http: HttpDescription,
}

/// Method, path and caller details of a function URL request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDescription {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// A function URL request with lower-cased header and cookie maps.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    event: FunctionUrlRequest,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl HttpRequest {
    /// Wraps `event`, indexing its headers and cookies by lower-case name.
    pub fn new(event: FunctionUrlRequest) -> Self {
        let headers = event
            .headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        let cookies = event
            .cookies
            .iter()
            .flatten()
            .map(|cookie| match cookie.split_once('=') {
                Some((name, value)) => (name.to_lowercase(), value.to_string()),
                None => (cookie.to_lowercase(), String::new()),
            })
            .collect();
        Self {
            event,
            headers,
            cookies,
        }
    }

    /// Returns the raw invocation payload.
    pub fn event(&self) -> &FunctionUrlRequest {
        &self.event
    }

    /// Returns the HTTP method, e.g. `GET`.
    pub fn method(&self) -> &str {
        &self.event.request_context.http.method
    }

    /// Returns the request path.
    pub fn raw_path(&self) -> &str {
        &self.event.raw_path
    }

    /// Returns the body as text.
    ///
    /// Fails with a validation error if the body is base64-encoded binary.
    pub fn body_as_string(&self) -> Result<&str, RunnerError> {
        if self.event.is_base64_encoded {
            return Err(RunnerError::validation("Body is base64-encoded"));
        }
        Ok(self.event.body.as_deref().unwrap_or_default())
    }

    /// Returns the body as bytes, decoding base64 if necessary.
    pub fn body_as_binary(&self) -> Result<Vec<u8>, RunnerError> {
        let body = self.event.body.as_deref().unwrap_or_default();
        if self.event.is_base64_encoded {
            STANDARD
                .decode(body)
                .map_err(|e| RunnerError::validation(format!("Invalid base64 body: {}", e)))
        } else {
            Ok(body.as_bytes().to_vec())
        }
    }

    /// Headers keyed by lower-case name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns the header `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Cookies keyed by lower-case name. A cookie without `=` maps to an empty value.
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }
}

impl From<FunctionUrlRequest> for HttpRequest {
    fn from(event: FunctionUrlRequest) -> Self {
        Self::new(event)
    }
}

/// Response returned to a function URL caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub cookies: Vec<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::status(204)
    }
}

impl HttpResponse {
    /// An empty response with the given status code.
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            cookies: Vec::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }

    /// 204 with no content.
    pub fn no_content() -> Self {
        Self::status(204)
    }

    /// 200 with a text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200).with_body(body)
    }

    /// 200 with a binary body, sent base64-encoded.
    pub fn ok_binary(body: impl AsRef<[u8]>) -> Self {
        Self::status(200).with_binary_body(body)
    }

    /// 404 Not Found.
    pub fn not_found() -> Self {
        Self::status(404)
    }

    /// 403 Forbidden.
    pub fn forbidden() -> Self {
        Self::status(403)
    }

    /// 401 Unauthorized.
    pub fn unauthorized() -> Self {
        Self::status(401)
    }

    /// 500 Internal Server Error.
    pub fn internal_server_error() -> Self {
        Self::status(500)
    }

    /// Replaces the body with text. A 204 status becomes 200.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_base64_encoded = false;
        self.promote_no_content();
        self
    }

    /// Replaces the body with base64-encoded bytes. A 204 status becomes 200.
    pub fn with_binary_body(mut self, body: impl AsRef<[u8]>) -> Self {
        self.body = STANDARD.encode(body);
        self.is_base64_encoded = true;
        self.promote_no_content();
        self
    }

    /// Adds a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a `Set-Cookie` value.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    fn promote_no_content(&mut self) {
        if self.status_code == 204 {
            self.status_code = 200;
        }
    }
}
