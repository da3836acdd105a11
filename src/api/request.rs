//! Request/response values passed across the [`Transport`](super::transport::Transport) seam.
//!
//! Authorization travels inside each request as a [`RequestContext`] captured
//! when the request is built. Nothing is attached from shared mutable state at
//! send time, so a logout racing an in-flight request cannot rewrite it.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::{BackendErrorPayload, LabError, Result};

/// HTTP verb subset used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Upper-case verb as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    bearer: Option<String>,
}

impl RequestContext {
    /// Context for unauthenticated endpoints (login, register, password reset).
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { bearer: None }
    }

    #[must_use]
    pub fn with_bearer(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bearer: (!token.trim().is_empty()).then_some(token),
        }
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A fully described backend call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, always starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub context: RequestContext,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            context: RequestContext::anonymous(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path with numeric segments collapsed to `:id`, for grouping in stats.
    #[must_use]
    pub fn endpoint_label(&self) -> String {
        let collapsed: Vec<&str> = self
            .path
            .split('/')
            .map(|segment| {
                if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                    ":id"
                } else {
                    segment
                }
            })
            .collect();
        collapsed.join("/")
    }
}

/// Raw backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// JSON reply helper, mostly for test transports.
    #[must_use]
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string().into_bytes())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Turn a non-2xx reply into the normalized backend error.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LabError::from_response(self.status, &self.body))
        }
    }

    /// Confirmation text from a success reply: a `message` field or short plain text.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        BackendErrorPayload::extract(&self.body)
    }

    /// Decode the body. An empty body decodes as JSON `null`, which lets
    /// `()` and `Option<T>` targets accept 204-style replies.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let trimmed = self.body.trim_ascii();
        if trimmed.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        serde_json::from_slice(trimmed).map_err(|error| LabError::Serialization {
            context: "response body",
            details: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_gets_leading_slash() {
        let req = ApiRequest::new(Method::Get, "admin/assets");
        assert_eq!(req.path, "/admin/assets");
    }

    #[test]
    fn endpoint_label_collapses_ids() {
        let req = ApiRequest::new(Method::Put, "/admin/assets/42/duplicate");
        assert_eq!(req.endpoint_label(), "/admin/assets/:id/duplicate");
        let req = ApiRequest::new(Method::Get, "/admin/rooms");
        assert_eq!(req.endpoint_label(), "/admin/rooms");
    }

    #[test]
    fn context_debug_redacts_token() {
        let ctx = RequestContext::with_bearer("secret-token");
        let rendered = format!("{ctx:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(ctx.is_authenticated());
        assert!(!RequestContext::with_bearer("  ").is_authenticated());
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let resp = ApiResponse::new(204, Vec::new());
        resp.decode::<()>().expect("unit decodes");
        let none: Option<u32> = resp.decode().expect("option decodes");
        assert_eq!(none, None);
    }

    #[test]
    fn error_for_status_normalizes_payload() {
        let resp = ApiResponse::json(400, &json!({"message": "Name is required"}));
        let err = resp.error_for_status().expect_err("400 is an error");
        assert_eq!(err.display_message(), "Name is required");
    }
}
