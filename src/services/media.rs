// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloudinary client for avatar and cover image uploads.
//!
//! Uploads are signed with the account's API secret. The staged local file is
//! removed once the upload has been attempted, whatever the outcome.

use crate::config::CloudinaryConfig;
use crate::error::AppError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A file stored on the media host.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    /// Public (HTTPS) URL of the asset
    pub url: String,
    /// Cloudinary public ID
    pub public_id: String,
}

/// Subset of Cloudinary's upload response that we use.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    public_id: String,
}

/// Media upload service.
#[derive(Clone)]
pub struct MediaService {
    /// HTTP client; `None` in mock mode
    http: Option<reqwest::Client>,
    base_url: String,
    credentials: CloudinaryConfig,
}

impl MediaService {
    pub fn new(credentials: CloudinaryConfig) -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
            credentials,
        }
    }

    /// Create a mock uploader for testing (offline mode).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            http: None,
            base_url: "https://res.cloudinary.com".to_string(),
            credentials: CloudinaryConfig {
                cloud_name: "mock".to_string(),
                api_key: "mock".to_string(),
                api_secret: "mock".to_string(),
            },
        }
    }

    /// Upload a staged local file and remove it afterwards.
    pub async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, AppError> {
        let result = self.upload_inner(local_path).await;

        if let Err(e) = tokio::fs::remove_file(local_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %local_path.display(), error = %e, "Failed to remove staged upload");
            }
        }

        result
    }

    async fn upload_inner(&self, local_path: &Path) -> Result<UploadedMedia, AppError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to read staged upload {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let Some(http) = &self.http else {
            // Mock mode (Debug builds only)
            let public_id = file_name
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| file_name.clone());
            return Ok(UploadedMedia {
                url: format!(
                    "{}/{}/image/upload/{}",
                    self.base_url, self.credentials.cloud_name, file_name
                ),
                public_id,
            });
        };

        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_upload(timestamp, &self.credentials.api_secret);

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone()),
            )
            .text("api_key", self.credentials.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = format!(
            "{}/{}/auto/upload",
            self.base_url, self.credentials.cloud_name
        );

        let response = http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::MediaUpload(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::MediaUpload(format!("HTTP {}: {}", status, body)));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::MediaUpload(format!("Unexpected upload response: {}", e)))?;

        let url = parsed
            .secure_url
            .or(parsed.url)
            .ok_or_else(|| AppError::MediaUpload("Upload response has no URL".to_string()))?;

        tracing::info!(public_id = %parsed.public_id, file = %file_name, "Media uploaded");

        Ok(UploadedMedia {
            url,
            public_id: parsed.public_id,
        })
    }
}

/// Cloudinary request signature: SHA-256 over the sorted signed parameters
/// followed by the API secret.
fn sign_upload(timestamp: i64, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("timestamp={}{}", timestamp, api_secret).as_bytes());
    hex::encode(hasher.finalize())
}
