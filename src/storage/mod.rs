pub mod local;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S3 error: {0}")]
    S3(String),
}

/// Abstract storage backend for user uploads.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store raw bytes under `key` and return the URL clients fetch them from.
    async fn upload_bytes(
        &self,
        data: &[u8],
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String, StorageError>;

    /// Return the provider name for logging.
    fn provider_name(&self) -> &str;
}

/// Detect file type from raw bytes (simplified).
pub fn detect_file_extension(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        ".png"
    } else if data.starts_with(b"\xff\xd8") {
        ".jpg"
    } else if data.starts_with(b"GIF8") {
        ".gif"
    } else if data.starts_with(b"RIFF") && data.len() > 12 && &data[8..12] == b"WEBP" {
        ".webp"
    } else {
        ".bin"
    }
}

/// Build a unique object key for an uploaded file.
///
/// The extension comes from the client filename when it has a short
/// alphanumeric one, otherwise it is sniffed from the content.
pub fn upload_key(filename: Option<&str>, data: &[u8]) -> String {
    let ext = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| detect_file_extension(data).to_string());
    format!("uploads/{}{ext}", uuid::Uuid::new_v4())
}

/// Reject keys that could escape the storage root.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == ".." || part.is_empty()) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
