//! Lumen Storage Library
//!
//! Object store abstraction used to fetch overlay images and the fallback image.
//! Objects are addressed by `(bucket, key)`; the S3 backend maps buckets onto real
//! S3 buckets while the local backend maps each bucket to a subdirectory.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use lumen_core::StorageBackend;
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
