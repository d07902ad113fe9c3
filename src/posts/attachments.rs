use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// A local image file read for attachment.
#[derive(Debug, Clone)]
pub struct LocalImage {
    pub filename: String,
    pub bytes: Bytes,
}

/// Expand `~` and read an image file from disk.
pub async fn load_local_image(path: &str) -> Result<LocalImage> {
    let expanded = PathBuf::from(shellexpand::tilde(path).to_string());
    let filename = expanded
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("No file name in path {}", expanded.display()))?
        .to_string();

    if !is_image_filename(&filename) {
        warn!("{} does not look like an image, attaching anyway", filename);
    }

    let data = fs::read(&expanded)
        .await
        .with_context(|| format!("Failed to read image {}", expanded.display()))?;
    if data.is_empty() {
        bail!("Image {} is empty", expanded.display());
    }

    Ok(LocalImage {
        filename,
        bytes: Bytes::from(data),
    })
}

/// Guess an image MIME type from the filename extension.
pub fn guess_image_mime(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        _ => return None,
    };
    Some(mime)
}

pub fn is_image_filename(filename: &str) -> bool {
    guess_image_mime(filename).is_some()
}
