//! Photo storage seam.

use async_trait::async_trait;
use uuid::Uuid;

use lapor_shared::clients::minio::MinioClient;
use lapor_shared::errors::{AppError, AppResult, ErrorCode};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes under `key` and returns the path to persist.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    async fn exists(&self, path: &str) -> anyhow::Result<bool>;
    async fn delete(&self, path: &str) -> anyhow::Result<()>;
    fn url(&self, path: &str) -> String;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl BlobStore for MinioClient {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        self.upload(key, bytes, content_type).await.map_err(anyhow::Error::msg)
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        MinioClient::exists(self, path).await.map_err(anyhow::Error::msg)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        MinioClient::delete(self, path).await.map_err(anyhow::Error::msg)
    }

    fn url(&self, path: &str) -> String {
        self.public_url(path)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        MinioClient::ping(self).await.map_err(anyhow::Error::msg)
    }
}

/// An uploaded photo that has not been stored yet.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl PhotoUpload {
    /// Checks type and size, returning the file extension to store under.
    pub fn validate(&self, max_bytes: usize) -> AppResult<&'static str> {
        let ext = match self.content_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => {
                return Err(AppError::with_details(
                    ErrorCode::UnsupportedPhoto,
                    "the photo must be an image (jpeg, png, webp, gif)",
                    serde_json::json!({ "photo": ["the photo must be an image (jpeg, png, webp, gif)"] }),
                ));
            }
        };

        if self.bytes.is_empty() {
            return Err(AppError::invalid_field("photo", "the photo is empty"));
        }
        if self.bytes.len() > max_bytes {
            return Err(AppError::invalid_field(
                "photo",
                format!("the photo may not be greater than {} kilobytes", max_bytes / 1024),
            ));
        }

        Ok(ext)
    }
}

pub fn report_photo_key(ext: &str) -> String {
    format!("reports/{}.{}", Uuid::now_v7(), ext)
}

/// Deletes a blob, logging instead of failing. Used where the reported
/// state is already committed and an orphaned object is acceptable.
pub async fn release(blobs: &dyn BlobStore, path: &str) {
    if let Err(e) = blobs.delete(path).await {
        tracing::warn!(error = %e, path = %path, "failed to release photo, object orphaned");
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: RwLock<HashMap<String, Vec<u8>>>,
        fail_deletes: std::sync::atomic::AtomicBool,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contains(&self, path: &str) -> bool {
            self.objects.read().unwrap().contains_key(path)
        }

        pub fn len(&self) -> usize {
            self.objects.read().unwrap().len()
        }

        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
            self.objects.write().unwrap().insert(key.to_string(), bytes);
            Ok(key.to_string())
        }

        async fn exists(&self, path: &str) -> anyhow::Result<bool> {
            Ok(self.contains(path))
        }

        async fn delete(&self, path: &str) -> anyhow::Result<()> {
            if self.fail_deletes.load(std::sync::atomic::Ordering::SeqCst) {
                anyhow::bail!("storage unavailable");
            }
            self.objects.write().unwrap().remove(path);
            Ok(())
        }

        fn url(&self, path: &str) -> String {
            format!("http://storage.test/lapor-media/{path}")
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
