//! Storage adapter trait and capability descriptor.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StorageError;
use crate::storage_key::StorageRef;

/// Shared handle to a storage adapter.
pub type StorageHandle = Arc<dyn StorageAdapter>;

/// Operations a backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct StorageCapabilities {
    /// Bytes can be written through the service.
    pub write_object: bool,
    /// Byte ranges can be read back through the service.
    pub read_object_range: bool,
    /// Object metadata can be fetched.
    pub head_object: bool,
    /// Objects can be deleted.
    pub delete_object: bool,
    /// Objects can be copied, including across buckets.
    pub copy_object: bool,
    /// Clients can upload directly with a presigned PUT.
    pub presign_put: bool,
    /// Clients can download directly with a presigned GET.
    pub presign_get: bool,
    /// Objects have a stable unauthenticated URL.
    pub public_url: bool,
}

impl StorageCapabilities {
    /// Every capability enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            write_object: true,
            read_object_range: true,
            head_object: true,
            delete_object: true,
            copy_object: true,
            presign_put: true,
            presign_get: true,
            public_url: true,
        }
    }

    /// Whether the backend can keep content private.
    ///
    /// Private content is served either through a presigned GET or by
    /// streaming the bytes through the service.
    #[must_use]
    pub const fn can_serve_private(&self) -> bool {
        self.presign_get || self.read_object_range
    }
}

/// Fixed description of a backend, consulted before every branching decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageDescriptor {
    /// Provider name persisted as a row's storage location.
    pub provider: &'static str,
    /// Supported operations.
    pub capabilities: StorageCapabilities,
}

/// Object metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ObjectHead {
    /// Whether the object exists.
    pub exists: bool,
    /// Object size in bytes.
    pub size_bytes: Option<u64>,
    /// Stored content type.
    pub content_type: Option<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectHead {
    /// Metadata for an absent object.
    #[must_use]
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Presigned URL for upload or download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use (PUT for upload, GET for download).
    pub method: String,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
    /// Headers the client must send with the request.
    pub headers: HashMap<String, String>,
}

impl PresignedUrl {
    /// Creates a descriptor expiring `ttl` from now.
    #[must_use]
    pub fn new(url: impl Into<String>, method: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            url: url.into(),
            method: method.into(),
            expires_at,
            headers: HashMap::new(),
        }
    }

    /// Adds a required request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Uniform object storage interface.
///
/// Every method validates its [`StorageRef`] before touching the backend.
/// Operations a backend lacks keep the default body and fail with
/// [`StorageError::Unsupported`]; callers are expected to check
/// [`StorageAdapter::descriptor`] first.
#[async_trait]
pub trait StorageAdapter: Send + Sync + fmt::Debug {
    /// Provider name and capabilities.
    fn descriptor(&self) -> StorageDescriptor;

    /// Writes an object, replacing any existing one.
    async fn write_object(
        &self,
        _target: &StorageRef,
        _body: Bytes,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("write_object"))
    }

    /// Reads bytes `start..end` of an object.
    ///
    /// The range is clipped to the object's length, so a short object yields
    /// fewer bytes rather than an error.
    async fn read_object_range(
        &self,
        _target: &StorageRef,
        _start: u64,
        _end: u64,
    ) -> Result<Bytes, StorageError> {
        Err(StorageError::Unsupported("read_object_range"))
    }

    /// Fetches object metadata. A missing object is reported with
    /// `exists == false`, not an error.
    async fn head_object(&self, _target: &StorageRef) -> Result<ObjectHead, StorageError> {
        Err(StorageError::Unsupported("head_object"))
    }

    /// Deletes an object. Deleting a missing object succeeds.
    async fn delete_object(&self, _target: &StorageRef) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("delete_object"))
    }

    /// Copies an object, possibly into another bucket.
    async fn copy_object(&self, _from: &StorageRef, _to: &StorageRef) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("copy_object"))
    }

    /// Presigns a direct upload.
    async fn presign_put(
        &self,
        _target: &StorageRef,
        _content_type: &str,
        _ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        Err(StorageError::Unsupported("presign_put"))
    }

    /// Presigns a direct download.
    async fn presign_get(
        &self,
        _target: &StorageRef,
        _ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        Err(StorageError::Unsupported("presign_get"))
    }

    /// Stable public URL of an object, when the backend exposes one.
    fn public_url(&self, _target: &StorageRef) -> Option<String> {
        None
    }

    /// Absolute filesystem path of an object, for backends on local disk.
    fn local_path(&self, _target: &StorageRef) -> Result<Option<PathBuf>, StorageError> {
        Ok(None)
    }
}

/// Joins a public base URL with a reference.
pub(crate) fn join_public_url(base: &str, target: &StorageRef) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        target.bucket,
        target.object_key
    )
}
