// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Multipart form parsing with files staged to disk.

use crate::error::{AppError, Result};
use axum::extract::Multipart;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest file extension kept from the client's file name.
const MAX_EXTENSION_LEN: usize = 8;

/// A file written to the upload directory.
///
/// The file is deleted when this value is dropped, so uploads that are never
/// forwarded to the media host do not accumulate on disk.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Text fields and staged files from one multipart request.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl MultipartForm {
    /// Read every part; parts with a file name are staged under `upload_dir`.
    ///
    /// Empty file parts are ignored, as browsers send those for untouched
    /// file inputs.
    pub async fn read(mut multipart: Multipart, upload_dir: &Path) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read file {}: {}", name, e))
                    })?;
                    if bytes.is_empty() {
                        continue;
                    }

                    let staged = stage(upload_dir, &file_name, &bytes).await?;
                    tracing::debug!(field = %name, path = %staged.path.display(), size = bytes.len(), "Staged upload");
                    form.files.insert(name, staged);
                }
                None => {
                    let value = field.text().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read field {}: {}", name, e))
                    })?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed text field value (empty string when absent).
    pub fn text(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    /// Take ownership of a staged file.
    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

async fn stage(upload_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<StagedFile> {
    tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "Failed to create upload dir {}: {}",
            upload_dir.display(),
            e
        ))
    })?;

    let path = upload_dir.join(staged_file_name(original_name));
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "Failed to stage upload {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(StagedFile { path })
}

/// Random file name that keeps only a short alphanumeric extension from the
/// client-supplied name.
fn staged_file_name(original_name: &str) -> String {
    let id = uuid::Uuid::new_v4();
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!("{}.{}", id, ext.to_ascii_lowercase()),
        None => id.to_string(),
    }
}
