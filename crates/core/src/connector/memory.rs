//! In-memory connector.
//!
//! Backs tests and the CLI. Every write is appended to an operation log so
//! tests can assert exactly which persistence calls a service method made.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use fm_shared::types::{FileOrder, FileUid, LinkId, PageRequest, PageResponse, VariantUid};
use fm_shared::{FmError, FmResult};

use super::{FileFilter, FilePatch, FmConnector, NewLink, VariantPatch};
use crate::fm::{FileRow, LinkRow, VariantRow};

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorOp {
    /// `insert_file`
    InsertFile(FileUid),
    /// `update_file_by_uid`
    UpdateFile(FileUid),
    /// `delete_file_by_uid`
    DeleteFile(FileUid),
    /// `insert_variant`
    InsertVariant(VariantUid),
    /// `update_variant_by_uid`
    UpdateVariant(VariantUid),
    /// `delete_variants_for_file`
    DeleteVariants(FileUid),
    /// `create_link`
    CreateLink(FileUid),
    /// `delete_link`
    DeleteLink(LinkId),
}

#[derive(Debug, Default)]
struct Tables {
    files: BTreeMap<FileUid, FileRow>,
    variants: BTreeMap<VariantUid, VariantRow>,
    links: Vec<LinkRow>,
    ops: Vec<ConnectorOp>,
    failing_links: HashSet<FileUid>,
}

/// Connector keeping rows in process memory.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    tables: Mutex<Tables>,
}

#[derive(Debug, thiserror::Error)]
#[error("link store rejected file {0}")]
struct RejectedLink(FileUid);

impl MemoryConnector {
    /// Creates an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `create_link` fail for a file.
    pub fn fail_links_for(&self, file_uid: FileUid) {
        self.lock().failing_links.insert(file_uid);
    }

    /// Every write so far, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<ConnectorOp> {
        self.lock().ops.clone()
    }

    /// Clears the operation log.
    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    /// Number of stored file rows.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    /// Number of stored variant rows.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.lock().variants.len()
    }
}

impl FmConnector for MemoryConnector {
    async fn get_file_by_uid(&self, uid: &FileUid) -> FmResult<Option<FileRow>> {
        Ok(self.lock().files.get(uid).cloned())
    }

    async fn insert_file(&self, row: FileRow) -> FmResult<FileRow> {
        let mut tables = self.lock();
        tables.ops.push(ConnectorOp::InsertFile(row.uid.clone()));
        tables.files.insert(row.uid.clone(), row.clone());
        Ok(row)
    }

    async fn update_file_by_uid(&self, uid: &FileUid, patch: FilePatch) -> FmResult<FileRow> {
        let mut tables = self.lock();
        let row = tables
            .files
            .get_mut(uid)
            .ok_or_else(|| FmError::not_found(format!("file {uid}")))?;
        patch.apply(row, Utc::now());
        let row = row.clone();
        tables.ops.push(ConnectorOp::UpdateFile(uid.clone()));
        Ok(row)
    }

    async fn delete_file_by_uid(&self, uid: &FileUid) -> FmResult<bool> {
        let mut tables = self.lock();
        tables.ops.push(ConnectorOp::DeleteFile(uid.clone()));
        Ok(tables.files.remove(uid).is_some())
    }

    async fn list_files(
        &self,
        filter: &FileFilter,
        page: PageRequest,
    ) -> FmResult<PageResponse<FileRow>> {
        let tables = self.lock();
        let mut rows: Vec<&FileRow> = tables.files.values().filter(|r| filter.matches(r)).collect();
        rows.sort_by(|a, b| {
            match page.order {
                FileOrder::NewestFirst => b.created_at.cmp(&a.created_at),
                FileOrder::OldestFirst => a.created_at.cmp(&b.created_at),
                FileOrder::Filename => a
                    .original_filename
                    .to_lowercase()
                    .cmp(&b.original_filename.to_lowercase()),
            }
            .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(page.window(rows.into_iter().cloned()))
    }

    async fn get_variant_by_uid(&self, uid: &VariantUid) -> FmResult<Option<VariantRow>> {
        Ok(self.lock().variants.get(uid).cloned())
    }

    async fn list_variants_for_file(&self, file_uid: &FileUid) -> FmResult<Vec<VariantRow>> {
        let tables = self.lock();
        let mut rows: Vec<VariantRow> = tables
            .variants
            .values()
            .filter(|v| &v.variant_of_uid == file_uid)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.uid.cmp(&b.uid)));
        Ok(rows)
    }

    async fn insert_variant(&self, row: VariantRow) -> FmResult<VariantRow> {
        let mut tables = self.lock();
        tables.ops.push(ConnectorOp::InsertVariant(row.uid.clone()));
        tables.variants.insert(row.uid.clone(), row.clone());
        Ok(row)
    }

    async fn update_variant_by_uid(
        &self,
        uid: &VariantUid,
        patch: VariantPatch,
    ) -> FmResult<VariantRow> {
        let mut tables = self.lock();
        let row = tables
            .variants
            .get_mut(uid)
            .ok_or_else(|| FmError::not_found(format!("variant {uid}")))?;
        patch.apply(row);
        let row = row.clone();
        tables.ops.push(ConnectorOp::UpdateVariant(uid.clone()));
        Ok(row)
    }

    async fn delete_variants_for_file(&self, file_uid: &FileUid) -> FmResult<u64> {
        let mut tables = self.lock();
        tables.ops.push(ConnectorOp::DeleteVariants(file_uid.clone()));
        let before = tables.variants.len();
        tables.variants.retain(|_, v| &v.variant_of_uid != file_uid);
        Ok((before - tables.variants.len()) as u64)
    }

    async fn count_links_for_file(&self, file_uid: &FileUid) -> FmResult<u64> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| &l.file_uid == file_uid)
            .count() as u64)
    }

    async fn create_link(&self, link: NewLink) -> FmResult<LinkRow> {
        let mut tables = self.lock();
        if tables.failing_links.contains(&link.file_uid) {
            return Err(FmError::connector(RejectedLink(link.file_uid)));
        }
        let row = LinkRow {
            id: LinkId::generate(),
            file_uid: link.file_uid,
            linked_entity_type: link.linked_entity_type,
            linked_entity_uid: link.linked_entity_uid,
            linked_field: link.linked_field,
            created_by: link.created_by,
            created_at: Utc::now(),
        };
        tables.ops.push(ConnectorOp::CreateLink(row.file_uid.clone()));
        tables.links.push(row.clone());
        Ok(row)
    }

    async fn delete_link(&self, id: &LinkId) -> FmResult<Option<LinkRow>> {
        let mut tables = self.lock();
        tables.ops.push(ConnectorOp::DeleteLink(id.clone()));
        let at = tables.links.iter().position(|l| &l.id == id);
        Ok(at.map(|at| tables.links.remove(at)))
    }

    async fn list_links_for_file(&self, file_uid: &FileUid) -> FmResult<Vec<LinkRow>> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| &l.file_uid == file_uid)
            .cloned()
            .collect())
    }

    async fn list_links_for_entity(
        &self,
        entity_type: &str,
        entity_uid: &str,
        field: Option<&str>,
    ) -> FmResult<Vec<LinkRow>> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| l.linked_entity_type == entity_type && l.linked_entity_uid == entity_uid)
            .filter(|l| field.is_none_or(|f| l.linked_field.as_deref() == Some(f)))
            .cloned()
            .collect())
    }
}
