//! Storage key codec.
//!
//! A persisted storage key is the opaque string `{bucket}/{object_key}`. The
//! codec is the single place bucket and object-key syntax is checked, so every
//! storage backend shares the same path-traversal defenses:
//!
//! - buckets are non-empty, contain no separator, and are never `.` or `..`
//! - object keys are non-empty, relative, and after resolving `..` segments
//!   never climb above their own root
//! - `\` is treated as a separator, so mixed-separator tricks resolve the same
//!   way on every platform

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Bucket plus object key addressing one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRef {
    /// Bucket (top-level namespace).
    pub bucket: String,
    /// Object key inside the bucket.
    pub object_key: String,
}

impl StorageRef {
    /// Creates a reference without validating it.
    #[must_use]
    pub fn new(bucket: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_key: object_key.into(),
        }
    }

    /// Encodes the reference into a storage key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if either component is invalid.
    pub fn encode(&self) -> Result<String, StorageError> {
        encode(self)
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object_key)
    }
}

/// Validates a bucket name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty names, names containing a
/// separator or NUL byte, and the `.`/`..` segments.
pub fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if bucket.is_empty() {
        return Err(StorageError::invalid_key("bucket is empty"));
    }
    if bucket.contains(['/', '\\', '\0']) {
        return Err(StorageError::invalid_key(format!(
            "bucket {bucket:?} contains a separator"
        )));
    }
    if bucket == "." || bucket == ".." {
        return Err(StorageError::invalid_key(format!(
            "bucket {bucket:?} is a relative segment"
        )));
    }
    Ok(())
}

/// Validates an object key and returns its normalized segments.
///
/// `.` and empty segments are dropped and `..` pops the previous segment.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if the key is empty, absolute, contains
/// a NUL byte, or resolves to a location above its root.
pub fn normalize_object_key(object_key: &str) -> Result<Vec<&str>, StorageError> {
    if object_key.is_empty() {
        return Err(StorageError::invalid_key("object key is empty"));
    }
    if object_key.contains('\0') {
        return Err(StorageError::invalid_key("object key contains NUL"));
    }
    if object_key.starts_with(['/', '\\']) || has_drive_prefix(object_key) {
        return Err(StorageError::invalid_key(format!(
            "object key {object_key:?} is absolute"
        )));
    }

    let mut segments = Vec::new();
    for segment in object_key.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::invalid_key(format!(
                        "object key {object_key:?} escapes its root"
                    )));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::invalid_key(format!(
            "object key {object_key:?} names no object"
        )));
    }
    Ok(segments)
}

fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Validates both components of a reference.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if either component is invalid.
pub fn validate_ref(storage_ref: &StorageRef) -> Result<(), StorageError> {
    validate_bucket(&storage_ref.bucket)?;
    normalize_object_key(&storage_ref.object_key)?;
    Ok(())
}

/// Encodes a reference as `{bucket}/{object_key}`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if either component is invalid.
pub fn encode(storage_ref: &StorageRef) -> Result<String, StorageError> {
    validate_ref(storage_ref)?;
    Ok(format!("{}/{}", storage_ref.bucket, storage_ref.object_key))
}

/// Decodes a storage key produced by [`encode`].
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if the key has no bucket prefix, no
/// object key after the first `/`, or either part fails validation.
pub fn decode(storage_key: &str) -> Result<StorageRef, StorageError> {
    let Some((bucket, object_key)) = storage_key.split_once('/') else {
        return Err(StorageError::invalid_key(format!(
            "storage key {storage_key:?} has no bucket prefix"
        )));
    };
    if bucket.is_empty() || object_key.is_empty() {
        return Err(StorageError::invalid_key(format!(
            "storage key {storage_key:?} is incomplete"
        )));
    }

    let storage_ref = StorageRef::new(bucket, object_key);
    validate_ref(&storage_ref)?;
    Ok(storage_ref)
}

/// Decodes a storage key, returning `None` instead of an error.
#[must_use]
pub fn try_decode(storage_key: &str) -> Option<StorageRef> {
    decode(storage_key).ok()
}


#[cfg(test)]
#[path = "storage_key_props.rs"]
mod props;
