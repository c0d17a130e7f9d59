//! S3-compatible object storage using Apache OpenDAL.
//!
//! One [`Operator`] is built per configured bucket, so a storage key's bucket
//! prefix selects the operator and the object key is the path inside it.
//!
//! Copies inside one bucket use the provider's server-side copy. Copies across
//! buckets have no shared operator, so the object is read from the source and
//! written to the destination.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{ErrorKind, Operator, services};
use tracing::debug;

use super::adapter::{
    ObjectHead, PresignedUrl, StorageAdapter, StorageCapabilities, StorageDescriptor,
    join_public_url,
};
use super::error::StorageError;
use crate::storage_key::{StorageRef, normalize_object_key, validate_bucket};

/// Provider name recorded for object-store objects.
pub const S3_PROVIDER: &str = "s3";

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Endpoint URL (R2, MinIO, AWS).
    pub endpoint: String,
    /// Region; `auto` for R2.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// Object storage over a set of buckets.
#[derive(Debug, Clone)]
pub struct ObjectStoreStorage {
    provider: &'static str,
    operators: HashMap<String, Operator>,
    public_base_url: Option<String>,
}

impl ObjectStoreStorage {
    /// Connects to an S3-compatible endpoint, one operator per bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Configuration`] if no bucket is configured or an
    /// operator cannot be built.
    pub fn s3(settings: &S3Settings, buckets: &[String]) -> Result<Self, StorageError> {
        if buckets.is_empty() {
            return Err(StorageError::configuration("s3 provider has no buckets"));
        }

        let mut operators = HashMap::with_capacity(buckets.len());
        for bucket in buckets {
            validate_bucket(bucket)?;
            let builder = services::S3::default()
                .endpoint(&settings.endpoint)
                .region(&settings.region)
                .bucket(bucket)
                .access_key_id(&settings.access_key_id)
                .secret_access_key(&settings.secret_access_key);
            let operator = Operator::new(builder)
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish();
            operators.insert(bucket.clone(), operator);
        }

        Ok(Self::from_operators(S3_PROVIDER, operators))
    }

    /// Wraps prebuilt operators keyed by bucket.
    #[must_use]
    pub fn from_operators(provider: &'static str, operators: HashMap<String, Operator>) -> Self {
        Self {
            provider,
            operators,
            public_base_url: None,
        }
    }

    /// Exposes objects under a public base URL (CDN or public bucket domain).
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Validates a reference and returns its operator and object path.
    fn locate(&self, target: &StorageRef) -> Result<(&Operator, String), StorageError> {
        validate_bucket(&target.bucket)?;
        let path = normalize_object_key(&target.object_key)?.join("/");
        let operator = self
            .operators
            .get(&target.bucket)
            .ok_or_else(|| StorageError::UnknownBucket(target.bucket.clone()))?;
        Ok((operator, path))
    }
}

fn into_presigned(request: &opendal::raw::PresignedRequest, ttl: Duration) -> PresignedUrl {
    let mut presigned = PresignedUrl::new(request.uri().to_string(), request.method().to_string(), ttl);
    for (name, value) in request.header() {
        if let Ok(value) = value.to_str() {
            presigned = presigned.with_header(name.as_str(), value);
        }
    }
    presigned
}

#[async_trait]
impl StorageAdapter for ObjectStoreStorage {
    fn descriptor(&self) -> StorageDescriptor {
        StorageDescriptor {
            provider: self.provider,
            capabilities: StorageCapabilities {
                public_url: self.public_base_url.is_some(),
                ..StorageCapabilities::all()
            },
        }
    }

    async fn write_object(
        &self,
        target: &StorageRef,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let (operator, path) = self.locate(target)?;
        let len = body.len();
        let mut write = operator.write_with(&path, body);
        if let Some(content_type) = content_type {
            write = write.content_type(content_type);
        }
        write.await?;
        debug!(key = %target, bytes = len, "Wrote object");
        Ok(())
    }

    async fn read_object_range(
        &self,
        target: &StorageRef,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StorageError> {
        let (operator, path) = self.locate(target)?;
        let len = operator
            .stat(&path)
            .await
            .map_err(|e| not_found_or(e, target))?
            .content_length();

        let start = start.min(len);
        let end = end.min(len);
        if end <= start {
            return Ok(Bytes::new());
        }

        let buffer = operator
            .read_with(&path)
            .range(start..end)
            .await
            .map_err(|e| not_found_or(e, target))?;
        Ok(buffer.to_bytes())
    }

    async fn head_object(&self, target: &StorageRef) -> Result<ObjectHead, StorageError> {
        let (operator, path) = self.locate(target)?;
        match operator.stat(&path).await {
            Ok(meta) => Ok(ObjectHead {
                exists: true,
                size_bytes: Some(meta.content_length()),
                content_type: meta.content_type().map(String::from),
                etag: meta.etag().map(String::from),
                last_modified: None,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ObjectHead::missing()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, target: &StorageRef) -> Result<(), StorageError> {
        let (operator, path) = self.locate(target)?;
        match operator.delete(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(key = %target, "Deleted object");
        Ok(())
    }

    async fn copy_object(&self, from: &StorageRef, to: &StorageRef) -> Result<(), StorageError> {
        let (source_op, source_path) = self.locate(from)?;
        let (dest_op, dest_path) = self.locate(to)?;

        if from.bucket == to.bucket {
            source_op
                .copy(&source_path, &dest_path)
                .await
                .map_err(|e| not_found_or(e, from))?;
        } else {
            let meta = source_op
                .stat(&source_path)
                .await
                .map_err(|e| not_found_or(e, from))?;
            let body = source_op
                .read(&source_path)
                .await
                .map_err(|e| not_found_or(e, from))?
                .to_bytes();
            let mut write = dest_op.write_with(&dest_path, body);
            if let Some(content_type) = meta.content_type() {
                write = write.content_type(content_type);
            }
            write.await?;
        }
        debug!(from = %from, to = %to, "Copied object");
        Ok(())
    }

    async fn presign_put(
        &self,
        target: &StorageRef,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let (operator, path) = self.locate(target)?;
        let request = operator.presign_write(&path, ttl).await?;
        Ok(into_presigned(&request, ttl).with_header("Content-Type", content_type))
    }

    async fn presign_get(
        &self,
        target: &StorageRef,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let (operator, path) = self.locate(target)?;
        let request = operator.presign_read(&path, ttl).await?;
        Ok(into_presigned(&request, ttl))
    }

    fn public_url(&self, target: &StorageRef) -> Option<String> {
        let base = self.public_base_url.as_deref()?;
        self.locate(target).ok()?;
        Some(join_public_url(base, target))
    }
}

fn not_found_or(err: opendal::Error, target: &StorageRef) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::not_found(target.to_string())
    } else {
        err.into()
    }
}
