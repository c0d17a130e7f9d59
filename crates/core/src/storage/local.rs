//! Local filesystem storage.
//!
//! Objects live at `{root}/{bucket}/{object_key}`. Every reference is validated
//! by the key codec before any filesystem call, so no object can resolve
//! outside its bucket directory.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::adapter::{
    ObjectHead, StorageAdapter, StorageCapabilities, StorageDescriptor, join_public_url,
};
use super::error::StorageError;
use crate::storage_key::{StorageRef, normalize_object_key, validate_bucket};

/// Provider name recorded for local objects.
pub const LOCAL_PROVIDER: &str = "local";

/// Filesystem-backed storage rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    /// Creates storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Exposes objects under a static file server URL.
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Data root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a reference to a path below the data root.
    fn resolve(&self, target: &StorageRef) -> Result<PathBuf, StorageError> {
        validate_bucket(&target.bucket)?;
        let segments = normalize_object_key(&target.object_key)?;
        let mut path = self.root.join(&target.bucket);
        path.extend(segments);
        Ok(path)
    }
}

fn map_io_error(err: std::io::Error, target: &StorageRef) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::not_found(target.to_string())
    } else {
        StorageError::operation(format!("{target}: {err}"))
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    fn descriptor(&self) -> StorageDescriptor {
        StorageDescriptor {
            provider: LOCAL_PROVIDER,
            capabilities: StorageCapabilities {
                write_object: true,
                read_object_range: true,
                head_object: true,
                delete_object: true,
                copy_object: true,
                presign_put: false,
                presign_get: false,
                public_url: self.public_base_url.is_some(),
            },
        }
    }

    async fn write_object(
        &self,
        target: &StorageRef,
        body: Bytes,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.resolve(target)?;
        ensure_parent(&path).await?;
        fs::write(&path, &body)
            .await
            .map_err(|e| map_io_error(e, target))?;
        debug!(key = %target, bytes = body.len(), "Wrote local object");
        Ok(())
    }

    async fn read_object_range(
        &self,
        target: &StorageRef,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StorageError> {
        let path = self.resolve(target)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| map_io_error(e, target))?;
        let len = file.metadata().await?.len();

        let start = start.min(len);
        let end = end.min(len);
        if end <= start {
            return Ok(Bytes::new());
        }

        file.seek(SeekFrom::Start(start)).await?;
        let wanted = usize::try_from(end - start)
            .map_err(|_| StorageError::operation("range does not fit in memory"))?;
        let mut buf = vec![0u8; wanted];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn head_object(&self, target: &StorageRef) -> Result<ObjectHead, StorageError> {
        let path = self.resolve(target)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(ObjectHead::missing()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ObjectHead::missing()),
            Err(e) => return Err(map_io_error(e, target)),
        };

        Ok(ObjectHead {
            exists: true,
            size_bytes: Some(meta.len()),
            content_type: None,
            etag: None,
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn delete_object(&self, target: &StorageRef) -> Result<(), StorageError> {
        let path = self.resolve(target)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %target, "Deleted local object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io_error(e, target)),
        }
    }

    async fn copy_object(&self, from: &StorageRef, to: &StorageRef) -> Result<(), StorageError> {
        let source = self.resolve(from)?;
        let dest = self.resolve(to)?;
        // fs::copy truncates the destination before reading the source.
        if source == dest {
            return Ok(());
        }
        ensure_parent(&dest).await?;
        fs::copy(&source, &dest)
            .await
            .map_err(|e| map_io_error(e, from))?;
        debug!(from = %from, to = %to, "Copied local object");
        Ok(())
    }

    fn public_url(&self, target: &StorageRef) -> Option<String> {
        let base = self.public_base_url.as_deref()?;
        self.resolve(target).ok()?;
        Some(join_public_url(base, target))
    }

    fn local_path(&self, target: &StorageRef) -> Result<Option<PathBuf>, StorageError> {
        let path = self.resolve(target)?;
        if path.is_absolute() {
            return Ok(Some(path));
        }
        let cwd = std::env::current_dir()?;
        Ok(Some(cwd.join(path)))
    }
}
