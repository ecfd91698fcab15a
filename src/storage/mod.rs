use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Blob Storage - Image Files
// ============================================================================
//
// Images are uploaded under a caller-chosen unique name and later resolved
// to a display URL. Only the contract and a process-local implementation
// live here.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Error uploading image '{name}': {reason}")]
    Upload { name: String, reason: String },

    #[error("Image '{0}' was not found in storage")]
    NotFound(String),

    #[error("Storage operation was cancelled")]
    Cancelled,
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store the image and return its stored name
    async fn upload_image(
        &self,
        data: Vec<u8>,
        name: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<String>;

    async fn image_url(&self, stored_name: &str, cancel: &CancellationToken) -> StorageResult<String>;

    /// Delete a stored image; used to undo an upload whose record was not saved
    async fn remove_image(&self, stored_name: &str, cancel: &CancellationToken) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
struct StoredBlob {
    content_type: String,
    data: Vec<u8>,
}

/// Process-local blob storage serving URLs under a fixed base
#[derive(Debug)]
pub struct InMemoryBlobStorage {
    base_url: String,
    blobs: RwLock<HashMap<String, StoredBlob>>,
    reject_uploads: AtomicBool,
}

impl InMemoryBlobStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: RwLock::new(HashMap::new()),
            reject_uploads: AtomicBool::new(false),
        }
    }

    /// Make every following upload fail (storage outage)
    #[cfg(test)]
    pub(crate) fn reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, stored_name: &str) -> bool {
        self.blobs.read().await.contains_key(stored_name)
    }

    #[cfg(test)]
    pub(crate) async fn image_count(&self) -> usize {
        self.blobs.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn content_type(&self, stored_name: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(stored_name)
            .map(|blob| blob.content_type.clone())
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn upload_image(
        &self,
        data: Vec<u8>,
        name: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<String> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload {
                name: name.to_string(),
                reason: "storage unavailable".to_string(),
            });
        }

        let size = data.len();
        self.blobs.write().await.insert(
            name.to_string(),
            StoredBlob {
                content_type: content_type.to_string(),
                data,
            },
        );

        tracing::debug!(name, size, content_type, "Stored image");
        Ok(name.to_string())
    }

    async fn image_url(&self, stored_name: &str, cancel: &CancellationToken) -> StorageResult<String> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let blobs = self.blobs.read().await;
        match blobs.get(stored_name) {
            Some(blob) if !blob.data.is_empty() => Ok(format!("{}/{}", self.base_url, stored_name)),
            _ => Err(StorageError::NotFound(stored_name.to_string())),
        }
    }

    async fn remove_image(&self, stored_name: &str, _cancel: &CancellationToken) -> StorageResult<()> {
        self.blobs
            .write()
            .await
            .remove(stored_name)
            .map(|blob| {
                tracing::debug!(name = stored_name, content_type = %blob.content_type, "Removed image");
            })
            .ok_or_else(|| StorageError::NotFound(stored_name.to_string()))
    }
}
