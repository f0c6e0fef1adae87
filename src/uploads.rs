//! Multipart form parsing and image storage.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::Multipart;

use crate::error::{AppError, AppResult};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// A multipart submission: text fields plus at most one stored file.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    /// Generated filename of the stored upload, relative to the uploads dir.
    pub file: Option<String>,
}

impl UploadForm {
    /// Read every part of `multipart`. The part named `file_field` is stored
    /// under `dir`; an empty file part counts as no file, and a second file
    /// part is rejected. On any error the stored file is removed again.
    pub async fn read(multipart: Multipart, file_field: &str, dir: &Path) -> AppResult<Self> {
        let mut form = UploadForm::default();

        if let Err(e) = form.read_parts(multipart, file_field, dir).await {
            if let Some(file) = form.file.take() {
                discard(dir, &file).await;
            }
            return Err(e);
        }

        Ok(form)
    }

    async fn read_parts(
        &mut self,
        mut multipart: Multipart,
        file_field: &str,
        dir: &Path,
    ) -> AppResult<()> {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field {
                let original = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                if data.is_empty() {
                    continue;
                }
                if self.file.is_some() {
                    return Err(AppError::BadRequest("Only one file can be uploaded".into()));
                }
                let original = original.unwrap_or_default();
                let filename = generated_name(&original)?;
                // Recorded first so a partial write is discarded too.
                self.file = Some(filename.clone());
                tokio::fs::write(dir.join(&filename), &data).await?;
                tracing::info!("Stored upload {} ({} bytes)", filename, data.len());
            } else {
                let value = field.text().await?;
                self.fields.insert(name, value);
            }
        }

        Ok(())
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Trimmed field value, `None` when missing or blank.
    pub fn optional(&self, name: &str) -> Option<&str> {
        Some(self.text(name).trim()).filter(|v| !v.is_empty())
    }
}

/// `<uuid-v7>.<ext>` for an accepted image filename.
pub fn generated_name(original: &str) -> AppResult<String> {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| {
            AppError::BadRequest("Only png, jpg, gif and webp images can be uploaded".into())
        })?;

    Ok(format!("{}.{}", uuid::Uuid::now_v7(), ext))
}

/// Best-effort removal of a file written by a request that then failed.
pub async fn discard(dir: &Path, filename: &str) {
    if let Err(e) = tokio::fs::remove_file(dir.join(filename)).await {
        tracing::warn!("Failed to remove upload {}: {}", filename, e);
    }
}
