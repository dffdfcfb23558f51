use super::StageService;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, ServerSideEncryption,
    ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration, ServerSideEncryptionRule,
};
use aws_sdk_s3::{config::Region, Client as S3Client};
use std::path::Path;
use std::time::Duration;

/// Connection settings for [`S3StageClient`].
#[derive(Debug, Clone)]
pub struct S3StageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Static `(access_key_id, secret_access_key)`; the default AWS
    /// credential chain is used when absent.
    pub credentials: Option<(String, String)>,
    pub url_ttl: Duration,
}

/// Staging area backed by an S3-compatible bucket with SSE enabled.
pub struct S3StageClient {
    client: S3Client,
    bucket: String,
    region: String,
    url_ttl: Duration,
}

impl S3StageClient {
    pub async fn new(settings: S3StageSettings) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let Some((access_key_id, secret_access_key)) = settings.credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "age-guesser-stage",
            ));
        }

        let config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint) = settings.endpoint {
            // S3-compatible stores (MinIO, Spaces) generally want path-style URLs
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(s3_config.build()),
            bucket: settings.bucket,
            region: settings.region,
            url_ttl: settings.url_ttl,
        })
    }

    async fn create_area(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => tracing::info!("Created staging bucket {}", self.bucket),
            Err(e) => {
                let already_ours = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you())
                    .unwrap_or(false);
                if !already_ours {
                    return Err(Error::Stage(format!(
                        "Failed to create bucket {}: {}",
                        self.bucket, e
                    )));
                }
            }
        }

        let by_default = ServerSideEncryptionByDefault::builder()
            .sse_algorithm(ServerSideEncryption::Aes256)
            .build()
            .map_err(|e| Error::Stage(format!("Invalid encryption settings: {}", e)))?;
        let encryption = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(by_default)
                    .build(),
            )
            .build()
            .map_err(|e| Error::Stage(format!("Invalid encryption settings: {}", e)))?;

        self.client
            .put_bucket_encryption()
            .bucket(&self.bucket)
            .server_side_encryption_configuration(encryption)
            .send()
            .await
            .map_err(|e| Error::Stage(format!("Failed to enable bucket encryption: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl StageService for S3StageClient {
    fn area(&self) -> &str {
        &self.bucket
    }

    async fn ensure_area(&self) -> Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        tracing::info!("Staging bucket {} not reachable, creating it", self.bucket);
        self.create_area().await
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| Error::Stage(format!("Failed to read scratch file: {}", e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type("image/jpeg")
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| Error::Stage(format!("Failed to upload file: {}", e)))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| Error::Stage(format!("Failed to list objects: {}", e)))?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }

    async fn locate(&self, key: &str) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| Error::Stage(format!("Invalid presign duration: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| Error::Stage(format!("Failed to presign object URL: {}", e)))?;

        Ok(request.uri().to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Stage(format!("Failed to delete object: {}", e)))?;

        Ok(())
    }
}
