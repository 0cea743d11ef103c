use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

use crate::error::ServiceError;

/// One object returned by a store listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Response overrides applied when the presigned GET is followed.
#[derive(Debug, Clone, Default)]
pub struct DownloadOverrides {
    pub content_disposition: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    fn bucket(&self) -> &str;

    async fn list_objects(
        &self,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage, ServiceError>;

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, ServiceError>;

    async fn presign_get_object(
        &self,
        key: &str,
        overrides: DownloadOverrides,
        expires_in: Duration,
    ) -> Result<String, ServiceError>;

    /// Signs a PUT for exactly `content_length` bytes; S3 rejects bodies of
    /// any other length.
    async fn presign_put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ServiceError>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

pub(crate) fn to_chrono(value: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

fn presigning_config(expires_in: Duration) -> Result<PresigningConfig, ServiceError> {
    PresigningConfig::builder()
        .expires_in(expires_in)
        .build()
        .map_err(|err| ServiceError::unexpected(format!("invalid presigning config: {err}")))
}

#[async_trait]
impl ContentStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(
        &self,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage, ServiceError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, ServiceError> {
        if keys.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ServiceError::unexpected)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(ServiceError::unexpected)?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        Ok(DeleteOutcome {
            deleted: response
                .deleted()
                .iter()
                .filter_map(|item| item.key().map(str::to_string))
                .collect(),
            failed: response
                .errors()
                .iter()
                .filter_map(|item| item.key().map(str::to_string))
                .collect(),
        })
    }

    async fn presign_get_object(
        &self,
        key: &str,
        overrides: DownloadOverrides,
        expires_in: Duration,
    ) -> Result<String, ServiceError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_response_content_disposition(overrides.content_disposition)
            .set_response_content_type(overrides.content_type)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(ServiceError::from_sdk)?;

        Ok(presigned.uri().to_string())
    }

    async fn presign_put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ServiceError> {
        let signed_length = i64::try_from(content_length).map_err(|_| {
            ServiceError::unexpected(format!("content length {content_length} is out of range"))
        })?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .content_length(signed_length)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(ServiceError::from_sdk)?;

        let mut headers: BTreeMap<String, String> = presigned
            .headers()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        headers
            .entry("content-length".to_string())
            .or_insert_with(|| content_length.to_string());

        Ok(PresignedUpload {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            headers,
        })
    }
}
