//! Issues time-limited write credentials so clients can put objects
//! straight into the bucket. Nothing is persisted here; the client
//! confirms the transfer later through the upload endpoint.

use crate::{config::UploadConfig, errors::UploadError, services::formatter::is_image};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client, config::Builder as S3ConfigBuilder, presigning::PresigningConfig,
    types::ObjectCannedAcl,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::{borrow::Cow, sync::Arc, time::Duration};
use tracing::{info, instrument};

/// Visibility requested for the object being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acl {
    PublicRead,
}

/// A single "put object" operation to be signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub acl: Option<Acl>,
    pub content_type: String,
}

/// The storage-credential capability: sign one put, return the URL.
#[async_trait]
pub trait PresignPut: Send + Sync {
    async fn presign_put(&self, req: &PutObjectRequest) -> Result<String, UploadError>;
}

/// Signs puts with the AWS SDK.
pub struct S3Presigner {
    client: S3Client,
    expires_in: Duration,
}

impl S3Presigner {
    pub async fn new(config: &UploadConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.signing_region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // MinIO / LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        info!(
            bucket = %config.bucket,
            region = %config.signing_region,
            "S3 presigner initialized"
        );

        Self {
            client: S3Client::from_conf(s3_config_builder.build()),
            expires_in: config.presigned_url_expiry(),
        }
    }
}

#[async_trait]
impl PresignPut for S3Presigner {
    async fn presign_put(&self, req: &PutObjectRequest) -> Result<String, UploadError> {
        let presigning_config = PresigningConfig::expires_in(self.expires_in)
            .map_err(|e| UploadError::Credential(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&req.bucket)
            .key(&req.key)
            .content_type(&req.content_type)
            .set_acl(req.acl.map(|Acl::PublicRead| ObjectCannedAcl::PublicRead))
            .presigned(presigning_config)
            .await
            .map_err(|e| UploadError::Credential(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Coordinates handed back to the client.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadCredential {
    pub url: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
}

#[derive(Clone)]
pub struct CredentialIssuer {
    config: Arc<UploadConfig>,
    presigner: Arc<dyn PresignPut>,
}

impl CredentialIssuer {
    pub fn new(config: Arc<UploadConfig>, presigner: Arc<dyn PresignPut>) -> Self {
        Self { config, presigner }
    }

    #[instrument(skip(self))]
    pub async fn issue_upload_credential(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadCredential, UploadError> {
        if filename.is_empty() || content_type.is_empty() {
            return Err(UploadError::InvalidRequest(
                "name and type are required".into(),
            ));
        }

        let decoded = decode_component(filename)?;

        let image = is_image(filename);
        let prefix = if image {
            &self.config.images_prefix
        } else {
            &self.config.files_prefix
        };

        let req = PutObjectRequest {
            bucket: self.config.bucket.clone(),
            key: format!("{}/{}", prefix, decoded),
            acl: image.then_some(Acl::PublicRead),
            content_type: content_type.to_string(),
        };

        let url = self.presigner.presign_put(&req).await?;
        Ok(UploadCredential {
            url,
            bucket: req.bucket,
            key: req.key,
        })
    }
}

/// Percent-decode a URI component. A `%` not followed by two hex digits,
/// or escapes that do not form UTF-8, are rejected.
fn decode_component(value: &str) -> Result<Cow<'_, str>, UploadError> {
    let bytes = value.as_bytes();
    let malformed = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if malformed {
        return Err(UploadError::InvalidRequest(
            "name contains a malformed percent escape".into(),
        ));
    }

    percent_decode_str(value)
        .decode_utf8()
        .map_err(|_| UploadError::InvalidRequest("name is not valid UTF-8".into()))
}
