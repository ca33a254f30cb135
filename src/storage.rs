use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::AppError;

const NAME_PREFIX_LEN: usize = 12;

/// Client for the public-read blob store. Objects are written once under a
/// collision-resistant name and addressed by the URL the store hands back;
/// there is no delete or versioning here.
#[derive(Clone, Debug)]
pub struct BlobClient {
    http_client: Client,
    pub(crate) base_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
struct PutBlobResponse {
    url: String,
}

impl BlobClient {
    pub fn new(base_url: String, authorization_token: String) -> Self {
        Self {
            http_client: Client::new(),
            base_url,
            authorization_token,
        }
    }

    /// Writes `content` under a randomized derivative of `suggested_name`
    /// and returns the public URL. No retry on failure; the caller decides
    /// whether to abort or resubmit.
    #[tracing::instrument(
        name = "put_blob",
        skip(self, content),
        fields(suggested_name = %suggested_name, size = content.len())
    )]
    pub async fn upload(&self, content: Bytes, suggested_name: &str) -> Result<String, AppError> {
        let object_name = generate_object_name(suggested_name);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), object_name);

        tracing::debug!("Writing object {} to blob store", object_name);

        let response = self
            .http_client
            .put(&url)
            // The store appends its own randomness on top of our prefix to
            // close the overwrite race between concurrent uploads.
            .query(&[("access", "public"), ("addRandomSuffix", "1")])
            .bearer_auth(&self.authorization_token)
            .header("Content-Type", "application/octet-stream")
            .body(content)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::StorageWrite(anyhow::anyhow!(
                "Blob store returned {} for object {}",
                response.status(),
                object_name
            )));
        }

        let blob = response.json::<PutBlobResponse>().await.map_err(|e| {
            AppError::StorageWrite(
                anyhow::Error::new(e).context("Failed to parse blob store response"),
            )
        })?;

        tracing::info!("Stored object {} at {}", object_name, blob.url);
        Ok(blob.url)
    }
}

/// Prefixes the suggested name with a random alphanumeric component so
/// repeated uploads of the same filename never collide.
pub fn generate_object_name(suggested_name: &str) -> String {
    let prefix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_PREFIX_LEN)
        .map(char::from)
        .collect();

    format!("{}-{}", prefix, suggested_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_keeps_the_suggested_name() {
        let name = generate_object_name("clip.mp4");
        assert!(name.ends_with("-clip.mp4"));
    }

    #[test]
    fn object_name_prefix_has_fixed_length() {
        let name = generate_object_name("clip.mp4");
        let prefix = name.strip_suffix("-clip.mp4").unwrap();
        assert_eq!(prefix.len(), NAME_PREFIX_LEN);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn object_names_are_distinct_across_calls() {
        let first = generate_object_name("clip.mp4");
        let second = generate_object_name("clip.mp4");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_a_storage_write_error() {
        let client = BlobClient::new(
            // Port 1 is never listening locally.
            "http://127.0.0.1:1".to_string(),
            "test-token".to_string(),
        );
        let err = client
            .upload(Bytes::from_static(b"hello"), "clip.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageWrite(_)));
    }
}
