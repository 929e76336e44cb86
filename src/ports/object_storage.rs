//! ObjectStorage port for user uploads.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads `bytes` to `bucket/path`, overwriting nothing.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DomainError>;

    /// Public URL of an object. Does not check the object exists.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}
