//! Image upload to the media host (Cloudinary unsigned preset).
//!
//! The returned `secure_url` is what asset and profile records store in `image`.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, multipart};
use serde::Deserialize;

use crate::core::config::MediaConfig;
use crate::core::errors::{LabError, Result};

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<UploadFailure>,
}

#[derive(Deserialize)]
struct UploadFailure {
    #[serde(default)]
    message: String,
}

pub struct MediaUploader {
    client: Client,
    endpoint: String,
    upload_preset: String,
}

impl MediaUploader {
    pub fn new(config: &MediaConfig, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = upload_endpoint(config)?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|error| LabError::Transport {
            details: format!("failed to build upload client: {error}"),
        })?;
        Ok(Self {
            client,
            endpoint,
            upload_preset: config.upload_preset.trim().to_string(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|source| LabError::io(path, source))?;
        let name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        self.upload_bytes(&name, bytes)
    }

    pub fn upload_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|error| LabError::Transport {
                details: error.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|error| LabError::Transport {
            details: format!("failed to read upload reply: {error}"),
        })?;
        parse_reply(status, &body)
    }
}

/// `{api_url}/{cloud_name}/image/upload`
pub fn upload_endpoint(config: &MediaConfig) -> Result<String> {
    if config.cloud_name.trim().is_empty() {
        return Err(LabError::InvalidConfig {
            details: "media.cloud_name is not set (VITE_CLOUDINARY_CLOUD_NAME)".to_string(),
        });
    }
    if config.upload_preset.trim().is_empty() {
        return Err(LabError::InvalidConfig {
            details: "media.upload_preset is not set (VITE_CLOUDINARY_UPLOAD_PRESET)".to_string(),
        });
    }
    Ok(format!(
        "{}/{}/image/upload",
        config.api_url.trim_end_matches('/'),
        config.cloud_name.trim()
    ))
}

fn parse_reply(status: u16, body: &[u8]) -> Result<String> {
    let reply = serde_json::from_slice::<UploadReply>(body).ok();
    if (200..300).contains(&status) {
        return reply
            .and_then(|r| r.secure_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| LabError::Serialization {
                context: "upload reply",
                details: "missing secure_url".to_string(),
            });
    }
    match reply.and_then(|r| r.error).map(|e| e.message) {
        Some(message) if !message.is_empty() => Err(LabError::Backend { status, message }),
        _ => Err(LabError::from_response(status, body)),
    }
}
