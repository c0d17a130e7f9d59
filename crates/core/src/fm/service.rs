//! File manager service.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use fm_shared::types::{FileUid, LinkId, PageRequest, PageResponse, UserUid, VariantUid};
use fm_shared::{FmConfig, FmError, FmResult};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::hooks::{WriteAction, WriteEvent, WriteHook};
use super::layout::{extension_for_mime, file_object_key, relocate, variant_object_key};
use super::types::{
    ContentAccess, DeleteOptions, DeleteOutcome, FileRow, FileUpdate, Lifecycle, LinkRow,
    MoveRequest, ReadUrl, ReadUrlKind, ReadUrlOptions, UploadFinalizeRequest, UploadInitRequest,
    UploadInitResponse, UploadMode, UploadStatus, VariantKind, VariantRow,
    VariantUploadFinalizeRequest, VariantUploadInitRequest, VariantUploadInitResponse, clean_text,
    normalize_tags,
};
use crate::connector::{FileFilter, FilePatch, FmConnector, NewLink, VariantPatch};
use crate::policy::{PolicyTable, base_name, check_extension, check_mime_type, normalize_mime_type};
use crate::sniff::{
    DIMENSION_PROBE_LEN, Dimensions, MIME_HEADER_LEN, image_dimensions, sniff_mime_from_header,
};
use crate::storage::{ObjectHead, StorageCapabilities, StorageHandle};
use crate::storage_key::{StorageRef, normalize_object_key};

/// Orchestrates uploads, variants, deletion, moves, and links.
///
/// Generic over the connector so hosts plug in their own persistence. The
/// service holds no per-file state and is shared behind an [`Arc`].
pub struct FmService<C: FmConnector> {
    config: FmConfig,
    connector: Arc<C>,
    storage: StorageHandle,
    policies: PolicyTable,
    on_write: Option<Arc<dyn WriteHook>>,
}

impl<C: FmConnector> FmService<C> {
    /// Create a new file manager service with the built-in policies.
    #[must_use]
    pub fn new(config: FmConfig, connector: Arc<C>, storage: StorageHandle) -> Self {
        Self {
            config,
            connector,
            storage,
            policies: PolicyTable::builtin(),
            on_write: None,
        }
    }

    /// Registers the post-write hook.
    #[must_use]
    pub fn with_write_hook(mut self, hook: Arc<dyn WriteHook>) -> Self {
        self.on_write = Some(hook);
        self
    }

    /// Replaces the upload policy table.
    #[must_use]
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Orchestration settings.
    #[must_use]
    pub fn config(&self) -> &FmConfig {
        &self.config
    }

    /// The persistence connector.
    #[must_use]
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// The storage adapter.
    #[must_use]
    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// The active policy table.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    fn capabilities(&self) -> StorageCapabilities {
        self.storage.descriptor().capabilities
    }

    fn provider(&self) -> &'static str {
        self.storage.descriptor().provider
    }

    async fn emit(
        &self,
        action: WriteAction,
        file_uid: &FileUid,
        variant_uid: Option<&VariantUid>,
        actor: Option<&UserUid>,
    ) {
        let Some(hook) = &self.on_write else {
            return;
        };
        let event = WriteEvent {
            action,
            file_uid: file_uid.clone(),
            variant_uid: variant_uid.cloned(),
            actor: actor.cloned(),
        };
        if let Err(e) = hook.on_write(&event).await {
            warn!(action = %action, file_uid = %file_uid, error = %e, "Write hook failed");
        }
    }

    async fn load_file(&self, uid: &FileUid) -> FmResult<FileRow> {
        self.connector
            .get_file_by_uid(uid)
            .await?
            .ok_or_else(|| FmError::not_found(format!("file {uid}")))
    }

    async fn load_variant(&self, uid: &VariantUid) -> FmResult<VariantRow> {
        self.connector
            .get_variant_by_uid(uid)
            .await?
            .ok_or_else(|| FmError::not_found(format!("variant {uid}")))
    }

    async fn upload_mode(&self, target: &StorageRef, content_type: &str) -> FmResult<UploadMode> {
        let caps = self.capabilities();
        if caps.presign_put {
            let ttl = Duration::from_secs(self.config.presign_put_ttl_secs);
            let upload = self.storage.presign_put(target, content_type, ttl).await?;
            Ok(UploadMode::Direct { upload })
        } else if caps.write_object {
            Ok(UploadMode::Proxied)
        } else {
            Err(FmError::storage(format!(
                "storage provider {} accepts no uploads",
                self.provider()
            )))
        }
    }

    async fn head_existing(&self, target: &StorageRef) -> FmResult<ObjectHead> {
        let head = self.storage.head_object(target).await?;
        if !head.exists {
            return Err(FmError::not_found(format!("object {target}")));
        }
        Ok(head)
    }

    // ------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------

    /// Starts an upload.
    ///
    /// Validates the request against the purpose's policy, picks the
    /// destination bucket, and creates a pending row. Storage that can presign
    /// uploads gets a direct upload; otherwise the bytes go through
    /// [`upload_write_and_finalize`](Self::upload_write_and_finalize).
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive size
    /// - `Policy` for allowlist violations and a destination hint outside the
    ///   bucket presets
    /// - `Storage` if the backend can take no uploads at all
    pub async fn upload_init(
        &self,
        request: UploadInitRequest,
        owner_user_uid: Option<UserUid>,
        created_by: Option<UserUid>,
    ) -> FmResult<UploadInitResponse> {
        let validated = self.policies.validate(
            &request.purpose,
            &request.filename,
            &request.content_type,
            request.size_bytes,
        )?;
        let purpose = validated.effective_purpose;

        let hint = request
            .destination_hint
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let bucket = match hint {
            Some(hint) if !self.config.is_bucket_allowed(hint) => {
                return Err(FmError::policy(format!(
                    "bucket {hint:?} is not an allowed destination"
                )));
            }
            Some(hint) => hint.to_string(),
            None => self.config.bucket_for_purpose(purpose.as_str()).to_string(),
        };

        let uid = FileUid::generate();
        let filename = base_name(&request.filename).trim().to_string();
        let target = StorageRef::new(bucket, file_object_key(purpose.as_str(), &uid, &filename));
        let storage_key = target.encode()?;

        let mode = self
            .upload_mode(&target, &validated.normalized_mime_type)
            .await?;

        let is_public = request.is_public || !self.capabilities().can_serve_private();
        let now = Utc::now();
        let row = FileRow {
            uid,
            owner_user_uid,
            created_by,
            original_filename: filename,
            mime_type: validated.normalized_mime_type,
            byte_size: validated.size_bytes,
            storage_location: self.provider().to_string(),
            storage_key,
            is_public,
            purpose,
            sha256: None,
            status: UploadStatus::Pending,
            lifecycle: Lifecycle::Live,
            title: clean_text(request.title),
            alt_text: clean_text(request.alt_text),
            tags: normalize_tags(request.tags),
            created_at: now,
            updated_at: now,
        };
        let file = self.connector.insert_file(row).await?;

        info!(
            file_uid = %file.uid,
            purpose = %purpose,
            key = %file.storage_key,
            direct = mode.is_direct(),
            "Upload initialized"
        );
        Ok(UploadInitResponse {
            object: file.storage_key.clone(),
            file,
            mode,
        })
    }

    /// Confirms a direct upload.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file row or the stored object is missing
    /// - `Validation` if `object` is not the file's key or the object is
    ///   larger than declared
    /// - `Policy` if the sniffed content type is not allowed for the purpose
    pub async fn upload_finalize(&self, request: UploadFinalizeRequest) -> FmResult<FileRow> {
        let file = self.load_file(&request.file_uid).await?;
        if request.object != file.storage_key {
            return Err(FmError::validation(format!(
                "object {:?} does not belong to file {}",
                request.object, file.uid
            )));
        }
        self.finalize_file(file, None).await
    }

    /// Writes the bytes of a proxied upload and finalizes it.
    ///
    /// A failed write triggers a best-effort delete of whatever partial object
    /// was left behind before the error is returned.
    ///
    /// # Errors
    ///
    /// - `Storage` if the backend cannot write or the write fails
    /// - `Validation` if the file is archived or the body exceeds the
    ///   declared size
    /// - everything [`upload_finalize`](Self::upload_finalize) returns
    pub async fn upload_write_and_finalize(
        &self,
        file_uid: &FileUid,
        body: Bytes,
        content_type: Option<&str>,
    ) -> FmResult<FileRow> {
        if !self.capabilities().write_object {
            return Err(FmError::storage(format!(
                "storage provider {} cannot write objects",
                self.provider()
            )));
        }

        let file = self.load_file(file_uid).await?;
        if file.is_archived() {
            return Err(FmError::validation(format!("file {file_uid} is archived")));
        }
        let body_len = body.len() as u64;
        if body_len > file.byte_size {
            return Err(FmError::validation(format!(
                "body of {body_len} bytes exceeds the declared {} bytes",
                file.byte_size
            )));
        }

        let target = file.storage_ref()?;
        let content_type = content_type.map_or_else(|| file.mime_type.clone(), normalize_mime_type);
        self.write_or_cleanup(&target, body.clone(), &content_type)
            .await?;

        let sha256 = hex::encode(Sha256::digest(&body));
        self.finalize_file(file, Some(sha256)).await
    }

    async fn write_or_cleanup(
        &self,
        target: &StorageRef,
        body: Bytes,
        content_type: &str,
    ) -> FmResult<()> {
        if let Err(err) = self
            .storage
            .write_object(target, body, Some(content_type))
            .await
        {
            if let Err(cleanup) = self.storage.delete_object(target).await {
                warn!(key = %target, error = %cleanup, "Cleanup after failed write failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn finalize_file(&self, file: FileRow, sha256: Option<String>) -> FmResult<FileRow> {
        let target = file.storage_ref()?;
        let head = self.head_existing(&target).await?;

        let size = head.size_bytes.unwrap_or(file.byte_size);
        if size > file.byte_size {
            return Err(FmError::validation(format!(
                "stored object is {size} bytes, more than the declared {}",
                file.byte_size
            )));
        }

        let mut mime_type = file.mime_type.clone();
        if self.capabilities().read_object_range {
            let header = self
                .storage
                .read_object_range(&target, 0, MIME_HEADER_LEN as u64)
                .await?;
            if let Some(sniffed) = sniff_mime_from_header(&header) {
                if sniffed != mime_type {
                    let (purpose, policy) = self.policies.resolve(file.purpose.as_str())?;
                    mime_type = check_mime_type(policy, purpose, sniffed)?;
                    debug!(file_uid = %file.uid, declared = %file.mime_type, sniffed, "Content type corrected");
                }
            }
        }

        let patch = FilePatch {
            byte_size: Some(size),
            mime_type: Some(mime_type),
            sha256: sha256.map(Some),
            status: Some(UploadStatus::Ready),
            ..FilePatch::default()
        };
        let row = self.connector.update_file_by_uid(&file.uid, patch).await?;

        info!(file_uid = %row.uid, bytes = size, "Upload finalized");
        self.emit(WriteAction::Upload, &row.uid, None, row.created_by.as_ref())
            .await;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------

    /// Starts a variant upload for a live file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the parent file is missing
    /// - `Validation` if the parent is archived, a dimension is zero, the
    ///   width exceeds the kind's maximum, the size is non-positive, or the
    ///   content type is not an image
    pub async fn variant_upload_init(
        &self,
        request: VariantUploadInitRequest,
    ) -> FmResult<VariantUploadInitResponse> {
        let parent = self.load_file(&request.file_uid).await?;
        if parent.is_archived() {
            return Err(FmError::validation(format!(
                "file {} is archived",
                parent.uid
            )));
        }

        let kind = request.variant_kind;
        if request.width == 0 || request.height == 0 {
            return Err(FmError::validation("variant dimensions must be positive"));
        }
        if request.width > kind.max_width() {
            return Err(FmError::validation(format!(
                "{kind} width {} exceeds {}",
                request.width,
                kind.max_width()
            )));
        }
        let Some(byte_size) = u64::try_from(request.size_bytes).ok().filter(|s| *s > 0) else {
            return Err(FmError::validation(format!(
                "invalid upload size {}",
                request.size_bytes
            )));
        };
        let mime_type = normalize_mime_type(&request.content_type);
        if !mime_type.starts_with("image/") {
            return Err(FmError::validation(format!(
                "variant content type {mime_type:?} is not an image"
            )));
        }

        let parent_ref = parent.storage_ref()?;
        let uid = VariantUid::generate();
        let object_key = variant_object_key(
            &parent_ref.object_key,
            parent.purpose.as_str(),
            &parent.uid,
            kind,
            &uid,
            extension_for_mime(&mime_type),
        );
        let target = StorageRef::new(parent_ref.bucket, object_key);
        let storage_key = target.encode()?;
        let mode = self.upload_mode(&target, &mime_type).await?;

        let row = VariantRow {
            uid,
            variant_of_uid: parent.uid,
            variant_kind: kind,
            width: request.width,
            height: request.height,
            storage_location: self.provider().to_string(),
            storage_key,
            byte_size,
            mime_type,
            status: UploadStatus::Pending,
            created_at: Utc::now(),
        };
        let variant = self.connector.insert_variant(row).await?;

        info!(
            file_uid = %variant.variant_of_uid,
            variant_uid = %variant.uid,
            kind = %kind,
            "Variant upload initialized"
        );
        Ok(VariantUploadInitResponse {
            object: variant.storage_key.clone(),
            variant,
            mode,
        })
    }

    /// Confirms a direct variant upload.
    ///
    /// For PNG, GIF, JPEG, and WEBP objects the real dimensions are read from
    /// the stored header and must match the declared ones within the
    /// configured pixel tolerance.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the variant, its parent, or the object is missing
    /// - `Validation` if the parent is archived, `object` is not the variant's
    ///   key, the object is larger than declared, the content is not an image,
    ///   or the dimensions are off by more than the tolerance
    pub async fn variant_upload_finalize(
        &self,
        request: VariantUploadFinalizeRequest,
    ) -> FmResult<VariantRow> {
        let variant = self.load_variant(&request.variant_uid).await?;
        let parent = self.load_file(&variant.variant_of_uid).await?;
        if parent.is_archived() {
            return Err(FmError::validation(format!(
                "file {} is archived",
                parent.uid
            )));
        }
        if request.object != variant.storage_key {
            return Err(FmError::validation(format!(
                "object {:?} does not belong to variant {}",
                request.object, variant.uid
            )));
        }
        self.finalize_variant(variant, parent.created_by.as_ref())
            .await
    }

    /// Writes the bytes of a proxied variant upload and finalizes it.
    ///
    /// # Errors
    ///
    /// - `Storage` if the backend cannot write or the write fails
    /// - `Validation` if the parent is archived or the body exceeds the
    ///   declared size
    /// - everything [`variant_upload_finalize`](Self::variant_upload_finalize)
    ///   returns
    pub async fn variant_write_and_finalize(
        &self,
        variant_uid: &VariantUid,
        body: Bytes,
        content_type: Option<&str>,
    ) -> FmResult<VariantRow> {
        if !self.capabilities().write_object {
            return Err(FmError::storage(format!(
                "storage provider {} cannot write objects",
                self.provider()
            )));
        }

        let variant = self.load_variant(variant_uid).await?;
        let parent = self.load_file(&variant.variant_of_uid).await?;
        if parent.is_archived() {
            return Err(FmError::validation(format!(
                "file {} is archived",
                parent.uid
            )));
        }
        let body_len = body.len() as u64;
        if body_len > variant.byte_size {
            return Err(FmError::validation(format!(
                "body of {body_len} bytes exceeds the declared {} bytes",
                variant.byte_size
            )));
        }

        let target = variant.storage_ref()?;
        let content_type =
            content_type.map_or_else(|| variant.mime_type.clone(), normalize_mime_type);
        self.write_or_cleanup(&target, body, &content_type).await?;
        self.finalize_variant(variant, parent.created_by.as_ref())
            .await
    }

    async fn finalize_variant(
        &self,
        variant: VariantRow,
        actor: Option<&UserUid>,
    ) -> FmResult<VariantRow> {
        let target = variant.storage_ref()?;
        let head = self.head_existing(&target).await?;

        let size = head.size_bytes.unwrap_or(variant.byte_size);
        if size > variant.byte_size {
            return Err(FmError::validation(format!(
                "stored object is {size} bytes, more than the declared {}",
                variant.byte_size
            )));
        }

        let mut mime_type = variant.mime_type.clone();
        if self.capabilities().read_object_range {
            let probe = self
                .storage
                .read_object_range(&target, 0, DIMENSION_PROBE_LEN)
                .await?;
            if let Some(sniffed) = sniff_mime_from_header(&probe) {
                if !sniffed.starts_with("image/") {
                    return Err(FmError::validation(format!(
                        "variant content is {sniffed}, not an image"
                    )));
                }
                mime_type = sniffed.to_string();
            }

            let declared = Dimensions::new(variant.width, variant.height);
            if let Some(actual) = image_dimensions(&mime_type, &probe) {
                if !declared.within_tolerance(actual, self.config.pixel_tolerance) {
                    return Err(FmError::validation(format!(
                        "declared {}x{} but image is {}x{}",
                        declared.width, declared.height, actual.width, actual.height
                    )));
                }
            }
        }

        let patch = VariantPatch {
            byte_size: Some(size),
            mime_type: Some(mime_type),
            status: Some(UploadStatus::Ready),
            ..VariantPatch::default()
        };
        let row = self
            .connector
            .update_variant_by_uid(&variant.uid, patch)
            .await?;

        info!(file_uid = %row.variant_of_uid, variant_uid = %row.uid, "Variant finalized");
        self.emit(
            WriteAction::VariantUpload,
            &row.variant_of_uid,
            Some(&row.uid),
            actor,
        )
        .await;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Archives a file. Archiving an archived file changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing.
    pub async fn archive_file(
        &self,
        file_uid: &FileUid,
        actor: Option<&UserUid>,
    ) -> FmResult<FileRow> {
        let file = self.load_file(file_uid).await?;
        if file.is_archived() {
            return Ok(file);
        }
        self.set_lifecycle(file_uid, Lifecycle::Archived { archived_at: Utc::now() }, actor)
            .await
    }

    /// Restores an archived file. Restoring a live file changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing.
    pub async fn restore_file(
        &self,
        file_uid: &FileUid,
        actor: Option<&UserUid>,
    ) -> FmResult<FileRow> {
        let file = self.load_file(file_uid).await?;
        if !file.is_archived() {
            return Ok(file);
        }
        self.set_lifecycle(file_uid, Lifecycle::Live, actor).await
    }

    async fn set_lifecycle(
        &self,
        file_uid: &FileUid,
        lifecycle: Lifecycle,
        actor: Option<&UserUid>,
    ) -> FmResult<FileRow> {
        let patch = FilePatch {
            lifecycle: Some(lifecycle),
            ..FilePatch::default()
        };
        let row = self.connector.update_file_by_uid(file_uid, patch).await?;
        let action = if lifecycle.is_archived() {
            WriteAction::Archive
        } else {
            WriteAction::Restore
        };
        info!(file_uid = %file_uid, action = %action, "File lifecycle changed");
        self.emit(action, file_uid, None, actor).await;
        Ok(row)
    }

    /// Deletes a file, or archives it while content still links to it.
    ///
    /// A linked file is only hard-deleted when `force` and `is_admin` are
    /// both set. Hard deletion removes every variant object, then the main
    /// object, then the variant rows, then the file row.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file is missing
    /// - `Authorization` for `force` without `is_admin` on a linked file
    /// - `Storage` if an object cannot be deleted; rows are kept in that case
    pub async fn delete_file(
        &self,
        file_uid: &FileUid,
        options: DeleteOptions,
    ) -> FmResult<DeleteOutcome> {
        let file = self.load_file(file_uid).await?;
        let actor = options.user_uid.as_ref();
        let link_count = self.connector.count_links_for_file(file_uid).await?;

        if link_count > 0 && !(options.force && options.is_admin) {
            if options.force {
                return Err(FmError::authorization(
                    "force-deleting a linked file requires an administrator",
                ));
            }
            if !file.is_archived() {
                self.set_lifecycle(file_uid, Lifecycle::Archived { archived_at: Utc::now() }, actor)
                    .await?;
            }
            info!(file_uid = %file_uid, link_count, "Linked file archived instead of deleted");
            return Ok(DeleteOutcome::Archived { link_count });
        }

        let variants = self.connector.list_variants_for_file(file_uid).await?;
        let mut targets = variants
            .iter()
            .map(VariantRow::storage_ref)
            .collect::<Result<Vec<_>, _>>()?;
        targets.push(file.storage_ref()?);

        for target in &targets {
            self.storage.delete_object(target).await?;
        }
        self.connector.delete_variants_for_file(file_uid).await?;
        self.connector.delete_file_by_uid(file_uid).await?;

        let deleted_objects = targets.len();
        info!(file_uid = %file_uid, deleted_objects, "File deleted");
        self.emit(WriteAction::Delete, file_uid, None, actor).await;
        Ok(DeleteOutcome::Deleted { deleted_objects })
    }

    /// Moves a file and its variants to another bucket and/or folder.
    ///
    /// Objects are copied first and the new keys persisted before the old
    /// objects are removed, so a failure never leaves a row pointing at a
    /// deleted object. Old objects that cannot be removed are only logged.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file is missing
    /// - `Validation` if the file is archived or the folder is not a valid key
    /// - `Policy` if the destination bucket is not a preset
    /// - `Storage` if copying fails
    pub async fn move_file(
        &self,
        file_uid: &FileUid,
        request: MoveRequest,
        actor: Option<&UserUid>,
    ) -> FmResult<FileRow> {
        let to_bucket = request
            .to_bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());
        if let Some(bucket) = to_bucket {
            if !self.config.is_bucket_allowed(bucket) {
                return Err(FmError::policy(format!(
                    "bucket {bucket:?} is not an allowed destination"
                )));
            }
        }
        let to_folder = match request
            .to_folder_path
            .as_deref()
            .map(|f| f.trim().trim_matches('/'))
            .filter(|f| !f.is_empty())
        {
            Some(folder) => Some(normalize_object_key(folder)?.join("/")),
            None => None,
        };

        let file = self.load_file(file_uid).await?;
        if file.is_archived() {
            return Err(FmError::validation(format!("file {file_uid} is archived")));
        }

        let current = file.storage_ref()?;
        let destination = relocate(&current, file_uid, to_bucket, to_folder.as_deref());
        let variants = self.connector.list_variants_for_file(file_uid).await?;
        let mut plans = Vec::with_capacity(variants.len());
        for variant in variants {
            let from = variant.storage_ref()?;
            let to = relocate(&from, file_uid, to_bucket, to_folder.as_deref());
            plans.push((variant.uid, from, to));
        }

        if destination == current && plans.iter().all(|(_, from, to)| from == to) {
            return Ok(file);
        }
        if !self.capabilities().copy_object {
            return Err(FmError::storage(format!(
                "storage provider {} cannot copy objects",
                self.provider()
            )));
        }

        // Entries already at their destination are left alone so a retried
        // move converges without rewriting objects in place.
        plans.retain(|(_, from, to)| from != to);
        let relocating = current != destination;

        for (_, from, to) in &plans {
            self.storage.copy_object(from, to).await?;
        }
        if relocating {
            self.storage.copy_object(&current, &destination).await?;
        }

        for (uid, _, to) in &plans {
            let patch = VariantPatch {
                storage_key: Some(to.encode()?),
                ..VariantPatch::default()
            };
            self.connector.update_variant_by_uid(uid, patch).await?;
        }
        let row = if relocating {
            let patch = FilePatch {
                storage_key: Some(destination.encode()?),
                ..FilePatch::default()
            };
            self.connector.update_file_by_uid(file_uid, patch).await?
        } else {
            file
        };

        let stale = plans
            .iter()
            .map(|(_, from, _)| from)
            .chain(relocating.then_some(&current));
        for old in stale {
            if let Err(e) = self.storage.delete_object(old).await {
                warn!(file_uid = %file_uid, key = %old, error = %e, "Failed to remove moved object");
            }
        }

        info!(file_uid = %file_uid, from = %current, to = %destination, "File moved");
        self.emit(WriteAction::Move, file_uid, None, actor).await;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Loads a file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing.
    pub async fn get_file(&self, file_uid: &FileUid) -> FmResult<FileRow> {
        self.load_file(file_uid).await
    }

    /// Lists one page of files in the requested order.
    pub async fn list_files(
        &self,
        filter: &FileFilter,
        page: PageRequest,
    ) -> FmResult<PageResponse<FileRow>> {
        self.connector.list_files(filter, page).await
    }

    /// Lists a file's variants.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing.
    pub async fn list_variants(&self, file_uid: &FileUid) -> FmResult<Vec<VariantRow>> {
        self.load_file(file_uid).await?;
        self.connector.list_variants_for_file(file_uid).await
    }

    /// Returns the provider's metadata for a file's object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file or its object is missing.
    pub async fn get_storage_object_metadata(&self, file_uid: &FileUid) -> FmResult<ObjectHead> {
        let file = self.load_file(file_uid).await?;
        self.head_existing(&file.storage_ref()?).await
    }

    async fn content_target(
        &self,
        file: &FileRow,
        kind: Option<VariantKind>,
    ) -> FmResult<StorageRef> {
        let Some(kind) = kind else {
            return Ok(file.storage_ref()?);
        };
        let variants = self.connector.list_variants_for_file(&file.uid).await?;
        let variant = variants
            .iter()
            .filter(|v| v.variant_kind == kind)
            .max_by_key(|v| (v.status == UploadStatus::Ready, v.created_at))
            .ok_or_else(|| FmError::not_found(format!("{kind} variant of file {}", file.uid)))?;
        Ok(variant.storage_ref()?)
    }

    /// Resolves a URL a client can read the file from.
    ///
    /// Tries a public URL for public files, then a presigned URL, and falls
    /// back to the service-routed canonical URL, so a URL is always produced
    /// for an existing file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file or the requested variant is missing.
    pub async fn resolve_read_url(
        &self,
        file_uid: &FileUid,
        options: ReadUrlOptions,
    ) -> FmResult<ReadUrl> {
        let file = self.load_file(file_uid).await?;
        let target = self.content_target(&file, options.variant_kind).await?;
        let caps = self.capabilities();

        if caps.public_url && file.is_public {
            if let Some(url) = self.storage.public_url(&target) {
                return Ok(ReadUrl {
                    kind: ReadUrlKind::Public,
                    url,
                    expires_at: None,
                });
            }
        }

        if caps.presign_get {
            let ttl = options
                .expires_in_seconds
                .unwrap_or(self.config.presign_get_ttl_secs);
            match self
                .storage
                .presign_get(&target, Duration::from_secs(ttl))
                .await
            {
                Ok(presigned) => {
                    return Ok(ReadUrl {
                        kind: ReadUrlKind::Signed,
                        url: presigned.url,
                        expires_at: Some(presigned.expires_at),
                    });
                }
                Err(e) => {
                    warn!(file_uid = %file_uid, error = %e, "Presigning read failed; using canonical URL");
                }
            }
        }

        Ok(ReadUrl {
            kind: ReadUrlKind::Canonical,
            url: self.canonical_url(file_uid, options.variant_kind),
            expires_at: None,
        })
    }

    /// Service-routed content URL.
    #[must_use]
    pub fn canonical_url(&self, file_uid: &FileUid, variant_kind: Option<VariantKind>) -> String {
        let base = self.config.canonical_url_base.trim_end_matches('/');
        match variant_kind {
            Some(kind) => format!("{base}/{file_uid}/content?variant={kind}"),
            None => format!("{base}/{file_uid}/content"),
        }
    }

    /// Resolves how the service's content route serves a file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file or the requested variant is missing
    /// - `Storage` if the backend neither exposes local paths nor presigns
    ///   reads
    pub async fn resolve_content_access(
        &self,
        file_uid: &FileUid,
        variant_kind: Option<VariantKind>,
    ) -> FmResult<ContentAccess> {
        let file = self.load_file(file_uid).await?;
        let target = self.content_target(&file, variant_kind).await?;

        if let Some(path) = self.storage.local_path(&target)? {
            return Ok(ContentAccess::LocalPath(path));
        }
        if self.capabilities().presign_get {
            let ttl = Duration::from_secs(self.config.presign_get_ttl_secs);
            let presigned = self.storage.presign_get(&target, ttl).await?;
            return Ok(ContentAccess::Redirect(presigned.url));
        }
        Err(FmError::storage(format!(
            "storage provider {} cannot serve content",
            self.provider()
        )))
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Records that an entity references a file.
    ///
    /// # Errors
    ///
    /// - `Validation` if the entity type or uid is blank
    /// - `NotFound` if the file is missing
    pub async fn create_link(&self, link: NewLink) -> FmResult<LinkRow> {
        let entity_type = link.linked_entity_type.trim();
        let entity_uid = link.linked_entity_uid.trim();
        if entity_type.is_empty() || entity_uid.is_empty() {
            return Err(FmError::validation("link entity type and uid are required"));
        }
        self.load_file(&link.file_uid).await?;

        let link = NewLink {
            linked_entity_type: entity_type.to_string(),
            linked_entity_uid: entity_uid.to_string(),
            linked_field: clean_text(link.linked_field),
            ..link
        };
        let row = self.connector.create_link(link).await?;
        debug!(file_uid = %row.file_uid, entity = %row.linked_entity_uid, "Link created");
        self.emit(
            WriteAction::LinkCreate,
            &row.file_uid,
            None,
            row.created_by.as_ref(),
        )
        .await;
        Ok(row)
    }

    /// Removes a link. Returns whether it existed.
    pub async fn delete_link(&self, id: &LinkId, actor: Option<&UserUid>) -> FmResult<bool> {
        let Some(row) = self.connector.delete_link(id).await? else {
            return Ok(false);
        };
        debug!(file_uid = %row.file_uid, entity = %row.linked_entity_uid, "Link removed");
        self.emit(WriteAction::LinkDelete, &row.file_uid, None, actor)
            .await;
        Ok(true)
    }

    /// Lists links pointing at a file.
    pub async fn list_links_for_file(&self, file_uid: &FileUid) -> FmResult<Vec<LinkRow>> {
        self.connector.list_links_for_file(file_uid).await
    }

    /// Lists links held by an entity; `field == None` lists every field.
    pub async fn list_links_for_entity(
        &self,
        entity_type: &str,
        entity_uid: &str,
        field: Option<&str>,
    ) -> FmResult<Vec<LinkRow>> {
        self.connector
            .list_links_for_entity(entity_type, entity_uid, field)
            .await
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Applies a metadata edit. Returns `None` for an empty edit, which
    /// reaches neither the connector nor the hook.
    ///
    /// Visibility stays public on storage that cannot keep content private.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing.
    pub async fn patch_file(
        &self,
        file_uid: &FileUid,
        update: FileUpdate,
        actor: Option<&UserUid>,
    ) -> FmResult<Option<FileRow>> {
        if update.is_empty() {
            return Ok(None);
        }
        let can_serve_private = self.capabilities().can_serve_private();
        let patch = FilePatch {
            title: update.title.map(clean_text),
            alt_text: update.alt_text.map(clean_text),
            tags: update.tags.map(normalize_tags),
            is_public: update.is_public.map(|p| p || !can_serve_private),
            ..FilePatch::default()
        };
        let row = self.connector.update_file_by_uid(file_uid, patch).await?;
        self.emit(WriteAction::Patch, file_uid, None, actor).await;
        Ok(Some(row))
    }

    /// Renames a file. The stored object keeps its key.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty name or one containing a path separator
    /// - `NotFound` if the file is missing
    /// - `Policy` if the new extension is not allowed for the file's purpose
    pub async fn rename_file(
        &self,
        file_uid: &FileUid,
        new_name: &str,
        actor: Option<&UserUid>,
    ) -> FmResult<FileRow> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(FmError::validation("file name is empty"));
        }
        if name.contains(['/', '\\']) {
            return Err(FmError::validation(format!(
                "file name {name:?} contains a path separator"
            )));
        }

        let file = self.load_file(file_uid).await?;
        if file.original_filename == name {
            return Ok(file);
        }
        let (purpose, policy) = self.policies.resolve(file.purpose.as_str())?;
        check_extension(policy, purpose, name)?;

        let patch = FilePatch {
            original_filename: Some(name.to_string()),
            ..FilePatch::default()
        };
        let row = self.connector.update_file_by_uid(file_uid, patch).await?;
        info!(file_uid = %file_uid, new_name = name, "File renamed");
        self.emit(WriteAction::Rename, file_uid, None, actor).await;
        Ok(row)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
