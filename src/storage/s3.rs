use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{error, info};

use super::{check_key, Storage, StorageError};

/// AWS S3 storage backend for public uploads.
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    public_base_url: Option<String>,
}

impl S3Storage {
    pub fn new(
        aws_access_key: &str,
        aws_secret_key: &str,
        region: &str,
        bucket: &str,
        public_base_url: Option<&str>,
    ) -> Self {
        let creds = aws_sdk_s3::config::Credentials::new(
            aws_access_key,
            aws_secret_key,
            None,
            None,
            "roleplay-server",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .credentials_provider(creds)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
            region: region.to_string(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        object_url(self.public_base_url.as_deref(), &self.bucket, &self.region, key)
    }
}

/// Virtual-hosted style URL unless an explicit base (e.g. a CDN) is configured.
fn object_url(public_base_url: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    match public_base_url {
        Some(base) => format!("{base}/{key}"),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com/{key}"),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload_bytes(
        &self,
        data: &[u8],
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        check_key(key)?;
        let body = aws_sdk_s3::primitives::ByteStream::from(data.to_vec());
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);

        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }

        req.send().await.map_err(|e| {
            error!("S3 upload error: {e}");
            StorageError::S3(format!("{e}"))
        })?;

        info!("Uploaded {key} to bucket {}", self.bucket);
        Ok(self.public_url(key))
    }

    fn provider_name(&self) -> &str {
        "aws-s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_virtual_hosted() {
        assert_eq!(
            object_url(None, "avatars", "us-east-2", "uploads/a.png"),
            "https://avatars.s3.us-east-2.amazonaws.com/uploads/a.png"
        );
    }

    #[test]
    fn test_object_url_custom_base() {
        assert_eq!(
            object_url(Some("https://cdn.example"), "avatars", "us-east-2", "uploads/a.png"),
            "https://cdn.example/uploads/a.png"
        );
    }
}
