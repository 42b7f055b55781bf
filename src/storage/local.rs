use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use super::{check_key, Storage, StorageError};

/// Local filesystem storage backend, served back under `public_base_url`.
pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(storage_path: &str, public_base_url: &str) -> Self {
        let base_path = PathBuf::from(storage_path);
        // Ensure directory exists (best-effort at construction time).
        std::fs::create_dir_all(&base_path).ok();
        Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload_bytes(
        &self,
        data: &[u8],
        key: &str,
        _content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        check_key(key)?;
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(format!("{}/{key}", self.public_base_url))
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_upload_returns_public_url() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap(), "http://localhost:8000/files/");

        let data = b"hello world";
        let url = storage
            .upload_bytes(data, "uploads/file.txt", Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8000/files/uploads/file.txt");

        let written = std::fs::read(dir.path().join("uploads/file.txt")).unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn test_local_overwrite() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap(), "/files");

        storage.upload_bytes(b"one", "a.bin", None).await.unwrap();
        storage.upload_bytes(b"two", "a.bin", None).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_local_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap(), "/files");

        let result = storage.upload_bytes(b"x", "../escape.txt", None).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
