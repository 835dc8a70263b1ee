//! Mock Storage implementation for testing

use crate::{Storage, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock storage implementation that stores objects in memory
pub struct MockStorage {
    files: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    failure: Mutex<Option<String>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            failure: Mutex::new(None),
        }
    }

    /// Set an object in the mock storage
    pub fn set_file(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
    }

    /// Make every subsequent read fail with a backend error
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(StorageError::BackendError(message));
        }
        self.files
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
