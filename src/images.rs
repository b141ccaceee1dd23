//! Image inlining for multimodal chat turns
//!
//! Converts client-supplied image references into inline data URIs suitable
//! for an OpenAI-compatible multimodal message. Remote URLs that do not point
//! at our own upload directory are passed through untouched; the upstream API
//! fetches those itself. Local uploads are decoded, auto-rotated per their
//! EXIF orientation, resized to fit within [`MAX_DIMENSION`] and re-encoded
//! as JPEG before being base64-inlined.
//!
//! Inlining is best-effort per image: any I/O or decode failure drops that
//! single image (logged) without failing the request.

use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::types::ContentPart;

/// Maximum width/height of an inlined image; larger images are scaled down
/// preserving aspect ratio, smaller ones are never upscaled.
pub const MAX_DIMENSION: u32 = 1280;

const JPEG_QUALITY: u8 = 80;

/// Per-image inlining failure. Never escalates to a request failure.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid upload reference: {0}")]
    InvalidReference(String),

    #[error("encoder task failed: {0}")]
    Task(String),
}

/// Resolves image references against the server's own upload directory.
pub struct ImageInliner {
    upload_dir: PathBuf,
}

impl ImageInliner {
    pub fn new(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
        }
    }

    /// Turn one image reference into an inline-ready content part.
    ///
    /// Returns `None` when the reference is unusable or the local file cannot
    /// be processed; callers drop such images and continue.
    pub async fn inline(&self, reference: &str) -> Option<ContentPart> {
        if reference.starts_with("data:image/") {
            // Already inlined by the client
            return Some(ContentPart::image(reference));
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            if let Some(filename) = upload_filename(reference) {
                return self.inline_upload(filename).await;
            }
            // External URL: the upstream API fetches it directly
            return Some(ContentPart::image(reference));
        }

        if let Some(filename) = reference.strip_prefix("/uploads/") {
            return self.inline_upload(filename).await;
        }

        warn!(reference = %reference, "Dropping unrecognized image reference");
        None
    }

    async fn inline_upload(&self, filename: &str) -> Option<ContentPart> {
        match self.encode_upload(filename).await {
            Ok(data_url) => Some(ContentPart::image(data_url)),
            Err(e) => {
                warn!(filename = %filename, error = %e, "Image inlining failed, dropping image");
                None
            }
        }
    }

    async fn encode_upload(&self, filename: &str) -> Result<String, ImageError> {
        // Uploads live in a flat directory; anything that walks out of it is
        // not a reference we ever handed out.
        if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
            return Err(ImageError::InvalidReference(filename.to_string()));
        }

        let path = self.upload_dir.join(filename);
        let bytes = tokio::fs::read(&path).await?;

        let data_url = tokio::task::spawn_blocking(move || encode_data_url(&bytes))
            .await
            .map_err(|e| ImageError::Task(e.to_string()))??;

        debug!(filename = %filename, encoded_len = data_url.len(), "Inlined uploaded image");
        Ok(data_url)
    }
}

/// Extract the upload filename from an absolute URL that points at our own
/// `/uploads/` path, with any query or fragment stripped.
fn upload_filename(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/uploads/")?;
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let name = &rest[..end];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Decode, auto-rotate, bound, and re-encode image bytes as a JPEG data URI.
fn encode_data_url(bytes: &[u8]) -> Result<String, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img = img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3);
    }

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
    img.to_rgb8().write_with_encoder(encoder)?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(&encoded)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn test_inliner() -> (ImageInliner, PathBuf) {
        let dir = std::env::temp_dir().join(format!("chatrelay-images-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let inliner = ImageInliner {
            upload_dir: dir.clone(),
        };
        (inliner, dir)
    }

    fn write_test_jpeg(dir: &PathBuf, name: &str, width: u32, height: u32) {
        let img = ImageBuffer::from_pixel(width, height, Rgb([64u8, 128u8, 192u8]));
        DynamicImage::ImageRgb8(img).save(dir.join(name)).unwrap();
    }

    fn decoded_dimensions(part: &ContentPart) -> (u32, u32) {
        let url = part.image_url().unwrap();
        let b64 = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = BASE64_STANDARD.decode(b64).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        (img.width(), img.height())
    }

    #[tokio::test]
    async fn data_uri_passes_through_unchanged() {
        let (inliner, _dir) = test_inliner();
        let reference = "data:image/png;base64,iVBORw0KGgo=";
        let part = inliner.inline(reference).await.unwrap();
        assert_eq!(part.image_url().unwrap(), reference);
    }

    #[tokio::test]
    async fn external_url_passes_through_unchanged() {
        let (inliner, _dir) = test_inliner();
        let reference = "https://example.com/cat.png";
        let part = inliner.inline(reference).await.unwrap();
        assert_eq!(part.image_url().unwrap(), reference);
    }

    #[tokio::test]
    async fn relative_upload_path_is_inlined() {
        let (inliner, dir) = test_inliner();
        write_test_jpeg(&dir, "small.jpg", 100, 50);

        let part = inliner.inline("/uploads/small.jpg").await.unwrap();
        assert!(part
            .image_url()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        // Small images are never upscaled
        assert_eq!(decoded_dimensions(&part), (100, 50));
    }

    #[tokio::test]
    async fn own_upload_url_is_inlined_and_bounded() {
        let (inliner, dir) = test_inliner();
        write_test_jpeg(&dir, "large.jpg", 2560, 1280);

        let part = inliner
            .inline("http://localhost:3001/uploads/large.jpg?v=1")
            .await
            .unwrap();
        let (w, h) = decoded_dimensions(&part);
        assert!(w <= MAX_DIMENSION && h <= MAX_DIMENSION);
        // Aspect ratio 2:1 preserved
        assert_eq!((w, h), (1280, 640));
    }

    #[tokio::test]
    async fn missing_file_is_dropped() {
        let (inliner, _dir) = test_inliner();
        assert!(inliner.inline("/uploads/no-such-file.jpg").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_dropped() {
        let (inliner, dir) = test_inliner();
        std::fs::write(dir.join("garbage.jpg"), b"not an image at all").unwrap();
        assert!(inliner.inline("/uploads/garbage.jpg").await.is_none());
    }

    #[tokio::test]
    async fn traversal_references_are_rejected() {
        let (inliner, _dir) = test_inliner();
        assert!(inliner.inline("/uploads/../secret.jpg").await.is_none());
    }

    #[tokio::test]
    async fn bare_filesystem_path_is_dropped() {
        let (inliner, _dir) = test_inliner();
        assert!(inliner.inline("/etc/passwd").await.is_none());
    }

    #[test]
    fn upload_filename_strips_query_and_fragment() {
        assert_eq!(
            upload_filename("http://h/uploads/a.jpg?x=1#y"),
            Some("a.jpg")
        );
        assert_eq!(upload_filename("http://h/uploads/"), None);
        assert_eq!(upload_filename("http://h/other/a.jpg"), None);
    }
}
