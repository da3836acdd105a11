//! JSON client over a [`Transport`]: attaches credentials, normalizes errors,
//! records request activity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::request::{ApiRequest, ApiResponse, Method, RequestContext};
use crate::api::transport::{HttpTransport, Transport};
use crate::auth::tokens::TokenStore;
use crate::core::config::Config;
use crate::core::errors::{LabError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::query::page::Page;

/// Cheaply cloneable handle shared by every service.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    activity: Option<ActivityLoggerHandle>,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenStore>) -> Self {
        Self {
            transport,
            tokens,
            activity: None,
        }
    }

    /// HTTP client for the configured backend.
    pub fn from_config(config: &Config, tokens: Arc<TokenStore>) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.api.base_url,
            config.api.timeout_ms.map(Duration::from_millis),
        )?;
        Ok(Self::new(Arc::new(transport), tokens))
    }

    /// Record every request on the activity logger.
    #[must_use]
    pub fn with_activity(mut self, handle: ActivityLoggerHandle) -> Self {
        self.activity = Some(handle);
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    #[must_use]
    pub fn activity(&self) -> Option<&ActivityLoggerHandle> {
        self.activity.as_ref()
    }

    /// Credentials as of now. Read through the token store on every call.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        self.tokens
            .access_token()
            .map_or_else(RequestContext::anonymous, RequestContext::with_bearer)
    }

    /// Request pre-bound to the current credentials.
    #[must_use]
    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest {
        ApiRequest::new(method, path).with_context(self.context())
    }

    /// Send a request and return the successful reply.
    pub fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let started = Instant::now();
        let outcome = self
            .transport
            .execute(request)
            .and_then(ApiResponse::error_for_status);
        self.record(request, &outcome, started.elapsed());
        outcome
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: Vec<(String, String)>) -> Result<T> {
        let request = self.request(Method::Get, path).with_query(query);
        self.execute(&request)?.decode()
    }

    pub fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .request(Method::Post, path)
            .with_body(serde_json::to_value(body)?);
        self.execute(&request)?.decode()
    }

    /// POST with no credentials attached, for the pre-login auth endpoints.
    pub fn post_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(Method::Post, path).with_body(serde_json::to_value(body)?);
        self.execute(&request)?.decode()
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        let request = self.request(Method::Delete, path);
        self.execute(&request).map(|_| ())
    }

    /// Send a request whose reply only confirms. Returns the server's message, if any.
    pub fn acknowledge(&self, request: &ApiRequest) -> Result<Option<String>> {
        Ok(self.execute(request)?.message())
    }

    /// Fetch one page of a list endpoint and check its bounds.
    pub fn list<T: DeserializeOwned>(&self, path: &str, query: Vec<(String, String)>) -> Result<Page<T>> {
        let page: Page<T> = self.get_json(path, query)?;
        page.validate()?;
        Ok(page)
    }

    fn record(&self, request: &ApiRequest, outcome: &Result<ApiResponse>, elapsed: Duration) {
        let Some(activity) = &self.activity else {
            return;
        };
        let (status, error_code, error_message) = match outcome {
            Ok(response) => (Some(response.status), None, None),
            Err(err) => {
                let status = match err {
                    LabError::Backend { status, .. } | LabError::Unauthorized { status, .. } => {
                        Some(*status)
                    }
                    _ => None,
                };
                (
                    status,
                    Some(err.code().to_string()),
                    Some(err.display_message()),
                )
            }
        };
        activity.send(ActivityEvent::RequestCompleted {
            method: request.method.as_str().to_string(),
            endpoint: request.endpoint_label(),
            status,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_code,
            error_message,
        });
    }
}
