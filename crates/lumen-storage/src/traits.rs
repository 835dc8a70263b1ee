//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use lumen_core::ImageHandlerError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for ImageHandlerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => {
                ImageHandlerError::upstream(404, "NoSuchKey", "The specified key does not exist.")
            }
            StorageError::InvalidKey(message) => {
                ImageHandlerError::upstream(400, "InvalidKey", message)
            }
            StorageError::ConfigError(message) => {
                ImageHandlerError::upstream(500, "StorageConfiguration", message)
            }
            other => ImageHandlerError::upstream(500, "InternalError", other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Backends (S3, local filesystem) implement this so the applicator can fetch
/// overlays without knowing where they live.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole object into memory
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
