//! Persistence boundary.
//!
//! The file manager never talks to a database directly. Hosts implement
//! [`FmConnector`] over their own storage; errors are wrapped in
//! [`FmError::Connector`](fm_shared::FmError::Connector) and propagated
//! unchanged.

mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use fm_shared::FmResult;
use fm_shared::types::{FileUid, LinkId, PageRequest, PageResponse, UserUid, VariantUid};
use serde::{Deserialize, Serialize};

use crate::fm::{FileRow, LinkRow, Lifecycle, UploadStatus, VariantRow};
use crate::policy::Purpose;

pub use memory::{ConnectorOp, MemoryConnector};

/// Partial update of a [`FileRow`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePatch {
    /// New original filename.
    pub original_filename: Option<String>,
    /// New MIME type.
    pub mime_type: Option<String>,
    /// New size.
    pub byte_size: Option<u64>,
    /// New storage key.
    pub storage_key: Option<String>,
    /// New visibility.
    pub is_public: Option<bool>,
    /// New content hash.
    pub sha256: Option<Option<String>>,
    /// New upload status.
    pub status: Option<UploadStatus>,
    /// New archive state.
    pub lifecycle: Option<Lifecycle>,
    /// New title.
    pub title: Option<Option<String>>,
    /// New alternative text.
    pub alt_text: Option<Option<String>>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
}

impl FilePatch {
    /// Applies the patch and stamps `updated_at`.
    pub fn apply(self, row: &mut FileRow, now: DateTime<Utc>) {
        if let Some(v) = self.original_filename {
            row.original_filename = v;
        }
        if let Some(v) = self.mime_type {
            row.mime_type = v;
        }
        if let Some(v) = self.byte_size {
            row.byte_size = v;
        }
        if let Some(v) = self.storage_key {
            row.storage_key = v;
        }
        if let Some(v) = self.is_public {
            row.is_public = v;
        }
        if let Some(v) = self.sha256 {
            row.sha256 = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
        if let Some(v) = self.lifecycle {
            row.lifecycle = v;
        }
        if let Some(v) = self.title {
            row.title = v;
        }
        if let Some(v) = self.alt_text {
            row.alt_text = v;
        }
        if let Some(v) = self.tags {
            row.tags = v;
        }
        row.updated_at = now;
    }
}

/// Partial update of a [`VariantRow`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPatch {
    /// New storage key.
    pub storage_key: Option<String>,
    /// New size.
    pub byte_size: Option<u64>,
    /// New MIME type.
    pub mime_type: Option<String>,
    /// New upload status.
    pub status: Option<UploadStatus>,
}

impl VariantPatch {
    /// Applies the patch.
    pub fn apply(self, row: &mut VariantRow) {
        if let Some(v) = self.storage_key {
            row.storage_key = v;
        }
        if let Some(v) = self.byte_size {
            row.byte_size = v;
        }
        if let Some(v) = self.mime_type {
            row.mime_type = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
    }
}

/// Input for creating a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLink {
    /// Referenced file.
    pub file_uid: FileUid,
    /// Type of the referencing entity.
    pub linked_entity_type: String,
    /// Uid of the referencing entity.
    pub linked_entity_uid: String,
    /// Field holding the reference.
    #[serde(default)]
    pub linked_field: Option<String>,
    /// Acting user.
    #[serde(default)]
    pub created_by: Option<UserUid>,
}

/// Filter for listing files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Only files owned by this user.
    #[serde(default)]
    pub owner_user_uid: Option<UserUid>,
    /// Only files with this purpose.
    #[serde(default)]
    pub purpose: Option<Purpose>,
    /// Only archived (`true`) or live (`false`) files.
    #[serde(default)]
    pub archived: Option<bool>,
}

impl FileFilter {
    /// Whether a row passes the filter.
    #[must_use]
    pub fn matches(&self, row: &FileRow) -> bool {
        self.owner_user_uid
            .as_ref()
            .is_none_or(|owner| row.owner_user_uid.as_ref() == Some(owner))
            && self.purpose.is_none_or(|p| row.purpose == p)
            && self.archived.is_none_or(|a| row.is_archived() == a)
    }
}

/// Persistence operations the file manager needs.
///
/// Implemented by the host application over its metadata store.
pub trait FmConnector: Send + Sync {
    /// Find a file by uid.
    fn get_file_by_uid(
        &self,
        uid: &FileUid,
    ) -> impl Future<Output = FmResult<Option<FileRow>>> + Send;

    /// Insert a new file row.
    fn insert_file(&self, row: FileRow) -> impl Future<Output = FmResult<FileRow>> + Send;

    /// Update a file row; `NotFound` if absent.
    fn update_file_by_uid(
        &self,
        uid: &FileUid,
        patch: FilePatch,
    ) -> impl Future<Output = FmResult<FileRow>> + Send;

    /// Delete a file row. Returns whether a row was removed.
    fn delete_file_by_uid(&self, uid: &FileUid) -> impl Future<Output = FmResult<bool>> + Send;

    /// List one page of matching files in `page.order`, ties broken by uid.
    fn list_files(
        &self,
        filter: &FileFilter,
        page: PageRequest,
    ) -> impl Future<Output = FmResult<PageResponse<FileRow>>> + Send;

    /// Find a variant by uid.
    fn get_variant_by_uid(
        &self,
        uid: &VariantUid,
    ) -> impl Future<Output = FmResult<Option<VariantRow>>> + Send;

    /// List a file's variants, oldest first.
    fn list_variants_for_file(
        &self,
        file_uid: &FileUid,
    ) -> impl Future<Output = FmResult<Vec<VariantRow>>> + Send;

    /// Insert a new variant row.
    fn insert_variant(&self, row: VariantRow)
    -> impl Future<Output = FmResult<VariantRow>> + Send;

    /// Update a variant row; `NotFound` if absent.
    fn update_variant_by_uid(
        &self,
        uid: &VariantUid,
        patch: VariantPatch,
    ) -> impl Future<Output = FmResult<VariantRow>> + Send;

    /// Delete every variant of a file. Returns the number removed.
    fn delete_variants_for_file(
        &self,
        file_uid: &FileUid,
    ) -> impl Future<Output = FmResult<u64>> + Send;

    /// Count links pointing at a file.
    fn count_links_for_file(&self, file_uid: &FileUid)
    -> impl Future<Output = FmResult<u64>> + Send;

    /// Create a link.
    fn create_link(&self, link: NewLink) -> impl Future<Output = FmResult<LinkRow>> + Send;

    /// Delete a link, returning the removed row.
    fn delete_link(&self, id: &LinkId) -> impl Future<Output = FmResult<Option<LinkRow>>> + Send;

    /// List links pointing at a file.
    fn list_links_for_file(
        &self,
        file_uid: &FileUid,
    ) -> impl Future<Output = FmResult<Vec<LinkRow>>> + Send;

    /// List links held by an entity, optionally restricted to one field.
    fn list_links_for_entity(
        &self,
        entity_type: &str,
        entity_uid: &str,
        field: Option<&str>,
    ) -> impl Future<Output = FmResult<Vec<LinkRow>>> + Send;
}
