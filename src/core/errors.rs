//! LAB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LabError>;

/// Top-level error type for labdesk.
#[derive(Debug, Error)]
pub enum LabError {
    #[error("[LAB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[LAB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[LAB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[LAB-2001] invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("[LAB-2101] no response from server: {details}")]
    Transport { details: String },

    #[error("[LAB-2102] backend rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("[LAB-2103] not authorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("[LAB-2104] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[LAB-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[LAB-3002] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[LAB-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[LAB-3900] unexpected failure: {details}")]
    Unknown { details: String },
}

impl LabError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "LAB-1001",
            Self::MissingConfig { .. } => "LAB-1002",
            Self::ConfigParse { .. } => "LAB-1003",
            Self::Validation { .. } => "LAB-2001",
            Self::Transport { .. } => "LAB-2101",
            Self::Backend { .. } => "LAB-2102",
            Self::Unauthorized { .. } => "LAB-2103",
            Self::Serialization { .. } => "LAB-2104",
            Self::Io { .. } => "LAB-3001",
            Self::Sql { .. } => "LAB-3002",
            Self::ChannelClosed { .. } => "LAB-3003",
            Self::Unknown { .. } => "LAB-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io { .. } | Self::Sql { .. } | Self::ChannelClosed { .. }
        )
    }

    /// Display-ready text for alerts and grid overlays, without the code prefix.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Validation { field, reason } => format!("{field}: {reason}"),
            Self::Transport { .. } => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            Self::Backend { message, .. } | Self::Unauthorized { message, .. } => message.clone(),
            Self::Unknown { details } if !details.is_empty() => details.clone(),
            Self::Unknown { .. } => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }

    /// Convenience constructor for client-side validation failures.
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map a non-success HTTP response into the backend error taxonomy.
    #[must_use]
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = BackendErrorPayload::extract(body)
            .unwrap_or_else(|| default_status_message(status).to_string());
        if status == 401 || status == 403 {
            Self::Unauthorized { status, message }
        } else {
            Self::Backend { status, message }
        }
    }
}

/// Structured error body returned by the backend.
///
/// Any of the three fields may be present; the most specific one wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendErrorPayload {
    #[serde(default)]
    pub business_error_description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendErrorPayload {
    /// Extract the best human-readable message from a raw error body.
    ///
    /// Falls back to the raw text when the body is short non-JSON text.
    #[must_use]
    pub fn extract(body: &[u8]) -> Option<String> {
        if let Ok(payload) = serde_json::from_slice::<Self>(body) {
            return [
                payload.business_error_description,
                payload.message,
                payload.error,
            ]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
        }
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() || text.len() > 200 || text.starts_with('<') {
            None
        } else {
            Some(text.to_string())
        }
    }
}

fn default_status_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Your session has expired. Please sign in again.",
        403 => "You do not have permission to perform this action.",
        404 => "The requested item was not found.",
        409 => "The item conflicts with an existing record.",
        500..=599 => "The server encountered an error.",
        _ => "Request failed",
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for LabError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for LabError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for LabError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for LabError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return Self::from_response(status.as_u16(), &[]);
        }
        if value.is_decode() {
            return Self::Serialization {
                context: "reqwest",
                details: value.to_string(),
            };
        }
        Self::Transport {
            details: value.to_string(),
        }
    }
}
