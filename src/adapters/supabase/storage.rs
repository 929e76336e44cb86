//! Object storage buckets.

use async_trait::async_trait;
use reqwest::Method;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::ObjectStorage;

use super::client::SupabaseClient;

pub struct SupabaseStorage {
    client: SupabaseClient,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DomainError> {
        let request = self
            .client
            .request(Method::POST, &format!("storage/v1/object/{}/{}", bucket, path))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.client.send_empty(request).await.map_err(|e| {
            DomainError::new(ErrorCode::StorageError, e.message)
                .with_detail("path", format!("{}/{}", bucket, path))
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.client.config().url,
            bucket,
            path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::supabase::SupabaseConfig;

    #[test]
    fn public_url_points_at_public_object_route() {
        let client =
            SupabaseClient::new(SupabaseConfig::new("https://abc.supabase.co", "anon")).unwrap();
        let storage = SupabaseStorage::new(client);

        assert_eq!(
            storage.public_url("user-photos", "u-1/1-x.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/user-photos/u-1/1-x.jpg"
        );
    }
}
