//! Transport seam: the only place that touches the network.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::api::request::{ApiRequest, ApiResponse, Method};
use crate::core::errors::{LabError, Result};

/// Executes a request and returns the raw reply.
///
/// Implementations return `Err` only when no response was obtained; HTTP error
/// statuses come back as `Ok` and are normalized by the client.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Blocking HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `base_url`. `timeout` of `None` keeps the reqwest default.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|error| LabError::Transport {
            details: format!("failed to build HTTP client: {error}"),
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = request.context.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|error| LabError::Transport {
            details: error.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|error| LabError::Transport {
            details: format!("failed to read response body: {error}"),
        })?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
