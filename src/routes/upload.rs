//! Image upload endpoint
//!
//! Accepts multipart image uploads, stores them under the configured upload
//! directory with collision-resistant generated names, and returns the
//! absolute URLs the front-end can reference in later chat requests.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Files accepted per upload request; extra files are ignored.
pub const MAX_UPLOAD_FILES: usize = 10;

/// Per-file size limit.
pub const MAX_UPLOAD_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Whole-request body cap: a full batch at the per-file limit plus multipart
/// framing slack.
pub const MAX_UPLOAD_BODY_BYTES: usize = MAX_UPLOAD_FILES * MAX_UPLOAD_FILE_BYTES + 1024 * 1024;

/// Upload response: one public URL per stored file
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

/// Store uploaded images and return their public URLs.
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut urls = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {}", e)))?
    {
        if urls.len() >= MAX_UPLOAD_FILES {
            warn!(
                max_files = MAX_UPLOAD_FILES,
                "Upload batch over the file limit, ignoring the rest"
            );
            break;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::BadRequest(
                "Only image files are accepted".to_string(),
            ));
        }

        let original_name = field.file_name().unwrap_or("image").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

        if data.len() > MAX_UPLOAD_FILE_BYTES {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the {} MB per-file limit",
                original_name,
                MAX_UPLOAD_FILE_BYTES / (1024 * 1024)
            )));
        }

        let filename = generate_filename(&original_name);
        let path = state.config.upload_dir.join(&filename);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to store upload: {}", e)))?;

        info!(filename = %filename, bytes = data.len(), content_type = %content_type, "Stored uploaded image");

        urls.push(format!(
            "{}/uploads/{}",
            state.config.public_base_url.trim_end_matches('/'),
            filename
        ));
    }

    Ok(Json(UploadResponse { urls }))
}

/// Collision-resistant stored name: epoch millis plus a uuid, keeping only a
/// sanitized extension from the client-supplied name.
fn generate_filename(original: &str) -> String {
    let ext: String = original
        .rsplit_once('.')
        .map(|(_, e)| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(8)
                .collect::<String>()
                .to_lowercase()
        })
        .unwrap_or_default();

    let stamp = chrono::Utc::now().timestamp_millis();
    let id = uuid::Uuid::new_v4().simple();

    if ext.is_empty() {
        format!("{}-{}", stamp, id)
    } else {
        format!("{}-{}.{}", stamp, id, ext)
    }
}
