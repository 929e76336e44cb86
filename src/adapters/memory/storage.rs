//! In-memory object storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::ObjectStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct InMemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new("memory://storage")
    }
}

impl InMemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DomainError> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) {
            return Err(DomainError::new(
                ErrorCode::StorageError,
                format!("{}/{} already exists", bucket, path),
            ));
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploads_never_overwrite() {
        let storage = InMemoryStorage::default();
        storage
            .upload("user-photos", "u/1.jpg", vec![1], "image/jpeg")
            .await
            .unwrap();

        assert!(storage
            .upload("user-photos", "u/1.jpg", vec![2], "image/jpeg")
            .await
            .is_err());
        assert_eq!(storage.object("user-photos", "u/1.jpg").unwrap().bytes, vec![1]);
        assert_eq!(
            storage.public_url("user-photos", "u/1.jpg"),
            "memory://storage/user-photos/u/1.jpg"
        );
    }
}
