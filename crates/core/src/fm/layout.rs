//! Object key layout.
//!
//! Files live at `{folder}/{file_uid}/{filename}` and their variants at
//! `{folder}/{file_uid}/variants/{kind}-{variant_uid}.{ext}`. The folder
//! defaults to the purpose name and is the only part a move rewrites.

use fm_shared::types::{FileUid, VariantUid};

use super::types::VariantKind;
use crate::storage_key::StorageRef;

/// Sanitize filename for storage key.
///
/// Keeps ASCII alphanumerics, dots, hyphens, and underscores; everything else
/// becomes `_`. A name made only of dots is replaced so it never reads as a
/// relative segment.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Object key of a new file.
#[must_use]
pub fn file_object_key(folder: &str, file_uid: &FileUid, filename: &str) -> String {
    format!("{folder}/{file_uid}/{}", sanitize_filename(filename))
}

/// Object key of a new variant, placed next to its parent's object.
#[must_use]
pub fn variant_object_key(
    parent_object_key: &str,
    fallback_folder: &str,
    file_uid: &FileUid,
    kind: VariantKind,
    variant_uid: &VariantUid,
    ext: &str,
) -> String {
    let root = uid_root(parent_object_key, file_uid)
        .unwrap_or_else(|| format!("{fallback_folder}/{file_uid}"));
    format!("{root}/variants/{kind}-{variant_uid}.{ext}")
}

/// Key prefix ending in the file uid segment, if the key has one.
fn uid_root(object_key: &str, file_uid: &FileUid) -> Option<String> {
    let segments: Vec<&str> = object_key.split('/').collect();
    let at = segments.iter().position(|s| *s == file_uid.as_str())?;
    Some(segments[..=at].join("/"))
}

/// Computes where an object lands after a move.
///
/// The bucket is replaced when `to_bucket` is set. With a folder, everything
/// before the file uid segment is replaced by it; a key without the uid
/// segment keeps only its final segment.
#[must_use]
pub fn relocate(
    current: &StorageRef,
    file_uid: &FileUid,
    to_bucket: Option<&str>,
    to_folder: Option<&str>,
) -> StorageRef {
    let bucket = to_bucket.unwrap_or(&current.bucket);
    let object_key = match to_folder {
        None => current.object_key.clone(),
        Some(folder) => {
            let segments: Vec<&str> = current.object_key.split('/').collect();
            let rest = match segments.iter().position(|s| *s == file_uid.as_str()) {
                Some(at) => segments[at + 1..].join("/"),
                None => segments.last().copied().unwrap_or_default().to_string(),
            };
            format!("{folder}/{file_uid}/{rest}")
        }
    };
    StorageRef::new(bucket, object_key)
}

/// File extension used for a variant's object key.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}
