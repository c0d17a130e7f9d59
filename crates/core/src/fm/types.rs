//! File manager rows, requests, and outcomes.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fm_shared::types::{FileUid, LinkId, UserUid, VariantUid};
use serde::{Deserialize, Deserializer, Serialize};

use crate::policy::Purpose;
use crate::storage::{PresignedUrl, StorageError};
use crate::storage_key::{self, StorageRef};

/// Whether the bytes behind a row have been confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Row created, object not yet confirmed.
    #[default]
    Pending,
    /// Object confirmed by finalize.
    Ready,
}

/// Archive state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Visible and mutable.
    #[default]
    Live,
    /// Soft-deleted; kept while content still links to it.
    Archived {
        /// When the file was archived.
        archived_at: DateTime<Utc>,
    },
}

impl Lifecycle {
    /// Returns true when archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Archived { .. })
    }

    /// Archive timestamp, if archived.
    #[must_use]
    pub fn archived_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Live => None,
            Self::Archived { archived_at } => Some(*archived_at),
        }
    }
}

/// A managed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    /// File uid.
    pub uid: FileUid,
    /// User the file belongs to.
    pub owner_user_uid: Option<UserUid>,
    /// User who started the upload.
    pub created_by: Option<UserUid>,
    /// Client filename without any directory part.
    pub original_filename: String,
    /// Normalized MIME type.
    pub mime_type: String,
    /// Declared size until finalize, then the stored size.
    pub byte_size: u64,
    /// Provider name of the storage holding the object.
    pub storage_location: String,
    /// Encoded `{bucket}/{object_key}`.
    pub storage_key: String,
    /// Whether the file may be served without authorization.
    pub is_public: bool,
    /// Upload purpose.
    pub purpose: Purpose,
    /// Hex SHA-256 of the content, when known.
    pub sha256: Option<String>,
    /// Upload status.
    pub status: UploadStatus,
    /// Archive state.
    pub lifecycle: Lifecycle,
    /// Display title.
    pub title: Option<String>,
    /// Alternative text for images.
    pub alt_text: Option<String>,
    /// Deduplicated tags in first-seen order.
    pub tags: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl FileRow {
    /// Returns true when archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.lifecycle.is_archived()
    }

    /// Decodes the storage key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the persisted key is malformed.
    pub fn storage_ref(&self) -> Result<StorageRef, StorageError> {
        storage_key::decode(&self.storage_key)
    }
}

/// Kind of a derived rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Small thumbnail.
    Thumb,
    /// Screen-sized preview.
    Preview,
    /// Video poster frame.
    Poster,
}

impl VariantKind {
    /// Every variant kind.
    pub const ALL: [Self; 3] = [Self::Thumb, Self::Preview, Self::Poster];

    /// Convert to the persisted string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Preview => "preview",
            Self::Poster => "poster",
        }
    }

    /// Parse from the persisted string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Widest image accepted for this kind.
    #[must_use]
    pub fn max_width(&self) -> u32 {
        match self {
            Self::Thumb => 512,
            Self::Preview => 2048,
            Self::Poster => 4096,
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived rendition owned by one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRow {
    /// Variant uid.
    pub uid: VariantUid,
    /// Parent file.
    pub variant_of_uid: FileUid,
    /// Variant kind.
    pub variant_kind: VariantKind,
    /// Declared width in pixels.
    pub width: u32,
    /// Declared height in pixels.
    pub height: u32,
    /// Provider name of the storage holding the object.
    pub storage_location: String,
    /// Encoded `{bucket}/{object_key}`.
    pub storage_key: String,
    /// Declared size until finalize, then the stored size.
    pub byte_size: u64,
    /// Normalized MIME type.
    pub mime_type: String,
    /// Upload status.
    pub status: UploadStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl VariantRow {
    /// Decodes the storage key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the persisted key is malformed.
    pub fn storage_ref(&self) -> Result<StorageRef, StorageError> {
        storage_key::decode(&self.storage_key)
    }
}

/// Record that content references a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRow {
    /// Link id.
    pub id: LinkId,
    /// Referenced file. Not enforced; the file may be gone.
    pub file_uid: FileUid,
    /// Type of the referencing entity.
    pub linked_entity_type: String,
    /// Uid of the referencing entity.
    pub linked_entity_uid: String,
    /// Field of the entity holding the reference.
    pub linked_field: Option<String>,
    /// User whose write created the link.
    pub created_by: Option<UserUid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Request to start a file upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadInitRequest {
    /// Purpose name selecting the upload policy.
    pub purpose: String,
    /// Client filename.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Declared size in bytes.
    pub size_bytes: i64,
    /// Whether the file should be publicly readable.
    #[serde(default)]
    pub is_public: bool,
    /// Requested bucket; must be a configured preset.
    #[serde(default)]
    pub destination_hint: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Alternative text.
    #[serde(default)]
    pub alt_text: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// How the client delivers the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadMode {
    /// Client PUTs straight to storage.
    Direct {
        /// Presigned upload.
        upload: PresignedUrl,
    },
    /// Client sends the bytes to the service.
    Proxied,
}

impl UploadMode {
    /// Returns true for direct uploads.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }
}

/// Result of [`upload_init`](super::FmService::upload_init).
#[derive(Debug, Clone, Serialize)]
pub struct UploadInitResponse {
    /// Pending file row.
    pub file: FileRow,
    /// Storage key the upload must land at; echoed back on finalize.
    pub object: String,
    /// Delivery mode.
    #[serde(flatten)]
    pub mode: UploadMode,
}

/// Request to confirm a direct upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFinalizeRequest {
    /// File being confirmed.
    pub file_uid: FileUid,
    /// Storage key returned by init.
    pub object: String,
}

/// Request to start a variant upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantUploadInitRequest {
    /// Parent file.
    pub file_uid: FileUid,
    /// Variant kind.
    pub variant_kind: VariantKind,
    /// Declared MIME type; must be an image type.
    pub content_type: String,
    /// Declared size in bytes.
    pub size_bytes: i64,
    /// Declared width in pixels.
    pub width: u32,
    /// Declared height in pixels.
    pub height: u32,
}

/// Result of [`variant_upload_init`](super::FmService::variant_upload_init).
#[derive(Debug, Clone, Serialize)]
pub struct VariantUploadInitResponse {
    /// Pending variant row.
    pub variant: VariantRow,
    /// Storage key the upload must land at.
    pub object: String,
    /// Delivery mode.
    #[serde(flatten)]
    pub mode: UploadMode,
}

/// Request to confirm a direct variant upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantUploadFinalizeRequest {
    /// Variant being confirmed.
    pub variant_uid: VariantUid,
    /// Storage key returned by init.
    pub object: String,
}

/// Options for [`delete_file`](super::FmService::delete_file).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Delete even when content still links to the file.
    pub force: bool,
    /// Caller is an administrator.
    pub is_admin: bool,
    /// Acting user.
    pub user_uid: Option<UserUid>,
}

/// What a delete did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// File still linked; archived instead.
    Archived {
        /// Links that kept the file alive.
        link_count: u64,
    },
    /// Objects and rows removed.
    Deleted {
        /// Storage objects deleted, variants included.
        deleted_objects: usize,
    },
}

/// Destination of a move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Target bucket; must be a configured preset.
    #[serde(default)]
    pub to_bucket: Option<String>,
    /// Folder replacing everything before the file uid in the object key.
    #[serde(default)]
    pub to_folder_path: Option<String>,
}

/// Options for [`resolve_read_url`](super::FmService::resolve_read_url).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadUrlOptions {
    /// Resolve a variant instead of the original.
    pub variant_kind: Option<VariantKind>,
    /// Signed URL lifetime; the configured default when unset.
    pub expires_in_seconds: Option<u64>,
}

/// Which tier produced a read URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadUrlKind {
    /// Stable unauthenticated URL.
    Public,
    /// Time-limited presigned URL.
    Signed,
    /// URL routed through the service.
    Canonical,
}

/// A URL a client can fetch content from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadUrl {
    /// Tier.
    pub kind: ReadUrlKind,
    /// The URL.
    pub url: String,
    /// Expiry of signed URLs.
    pub expires_at: Option<DateTime<Utc>>,
}

/// How the service itself serves content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentAccess {
    /// Stream the file at this absolute path.
    LocalPath(PathBuf),
    /// Redirect the client.
    Redirect(String),
}

/// Editable metadata. `None` leaves a field unchanged; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    /// New title.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    /// New alternative text.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<Option<String>>,
    /// Replacement tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

/// A field that is present deserializes to `Some`, even when it is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl FileUpdate {
    /// Returns true when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.alt_text.is_none()
            && self.tags.is_none()
            && self.is_public.is_none()
    }
}

/// Trims tags, drops empty ones, and removes duplicates keeping first-seen order.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Trims optional text, mapping blank values to `None`.
#[must_use]
pub fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
