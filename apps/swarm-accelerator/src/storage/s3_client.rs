//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use axum::body::Bytes;

use crate::config::S3Config;

use super::types::{BlobBucket, StorageError};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &S3Config) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "swarm-accelerator",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let client = Client::from_conf(s3_config);

        // Test connection by checking if bucket exists
        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    e
                );
            }
        }

        Ok(Self { client, bucket })
    }

    /// Get an object's data, `None` if the key does not exist
    pub async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    return Ok(None);
                }
                return Err(StorageError::SdkError(format!("Failed to get object {}: {}", key, e)));
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to read object body: {}", e)))?
            .into_bytes();

        Ok(Some(data))
    }

    /// Put an object
    ///
    /// S3 acknowledges a PUT only after the object is durably stored.
    pub async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to put object {}: {}", key, e)))?;

        Ok(())
    }

    /// Check if an object exists (HEAD request)
    pub async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(StorageError::SdkError(format!("Failed to head object {}: {}", key, e)))
                }
            }
        }
    }
}

#[async_trait]
impl BlobBucket for S3Client {
    async fn download(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.get_object(key).await
    }

    async fn upload(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.put_object(key, data, "application/octet-stream").await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.object_exists(key).await
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
