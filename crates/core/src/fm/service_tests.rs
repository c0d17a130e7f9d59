use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use fm_shared::error::BoxError;
use fm_shared::types::{FileUid, UserUid};
use fm_shared::{FmConfig, FmError};
use sha2::{Digest, Sha256};

use super::*;
use crate::connector::{ConnectorOp, MemoryConnector, NewLink};
use crate::storage::{
    LocalStorage, MemoryStorage, StorageAdapter, StorageCall, StorageCapabilities, StorageHandle,
};
use crate::storage_key::StorageRef;

const PDF_BODY: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0x1f, 0x15, 0xc4, 0x89]);
    bytes
}

fn private_caps() -> StorageCapabilities {
    StorageCapabilities {
        public_url: false,
        ..StorageCapabilities::all()
    }
}

fn proxied_caps() -> StorageCapabilities {
    StorageCapabilities {
        presign_put: false,
        ..private_caps()
    }
}

#[derive(Default)]
struct RecordingHook {
    events: Mutex<Vec<WriteEvent>>,
}

impl RecordingHook {
    fn actions(&self) -> Vec<WriteAction> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.action)
            .collect()
    }
}

#[async_trait]
impl WriteHook for RecordingHook {
    async fn on_write(&self, event: &WriteEvent) -> Result<(), BoxError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingHook;

#[async_trait]
impl WriteHook for FailingHook {
    async fn on_write(&self, _event: &WriteEvent) -> Result<(), BoxError> {
        Err("hook exploded".into())
    }
}

struct Harness {
    service: FmService<MemoryConnector>,
    connector: Arc<MemoryConnector>,
    storage: Arc<MemoryStorage>,
    hook: Arc<RecordingHook>,
}

impl Harness {
    fn new(storage: MemoryStorage) -> Self {
        Self::with_config(storage, FmConfig::default())
    }

    fn with_config(storage: MemoryStorage, config: FmConfig) -> Self {
        let storage = Arc::new(storage);
        let connector = Arc::new(MemoryConnector::new());
        let hook = Arc::new(RecordingHook::default());
        let handle: StorageHandle = storage.clone();
        let service = FmService::new(config, Arc::clone(&connector), handle)
            .with_write_hook(hook.clone());
        Self {
            service,
            connector,
            storage,
            hook,
        }
    }

    fn update_count(&self, uid: &FileUid) -> usize {
        self.connector
            .ops()
            .iter()
            .filter(|op| **op == ConnectorOp::UpdateFile(uid.clone()))
            .count()
    }

    fn deletes(&self) -> Vec<StorageRef> {
        self.storage
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Delete(target) => Some(target),
                _ => None,
            })
            .collect()
    }

    /// Uploads a file directly and finalizes it.
    async fn ready_file(&self, purpose: &str, filename: &str, mime: &str, body: &[u8]) -> FileRow {
        let init = self
            .service
            .upload_init(request(purpose, filename, mime, 1024 * 1024), None, Some(UserUid::new("u1")))
            .await
            .unwrap();
        self.storage
            .insert(init.file.storage_ref().unwrap(), body.to_vec(), Some(mime));
        self.service
            .upload_finalize(UploadFinalizeRequest {
                file_uid: init.file.uid.clone(),
                object: init.object,
            })
            .await
            .unwrap()
    }

    async fn add_variant(&self, file: &FileRow, kind: VariantKind, body: &[u8]) -> VariantRow {
        let init = self
            .service
            .variant_upload_init(VariantUploadInitRequest {
                file_uid: file.uid.clone(),
                variant_kind: kind,
                content_type: "image/png".to_string(),
                size_bytes: 4096,
                width: 100,
                height: 100,
            })
            .await
            .unwrap();
        self.storage
            .insert(init.variant.storage_ref().unwrap(), body.to_vec(), Some("image/png"));
        init.variant
    }

    async fn link(&self, file: &FileRow, entity_uid: &str) -> LinkRow {
        self.service
            .create_link(NewLink {
                file_uid: file.uid.clone(),
                linked_entity_type: "post".to_string(),
                linked_entity_uid: entity_uid.to_string(),
                linked_field: Some("body".to_string()),
                created_by: None,
            })
            .await
            .unwrap()
    }
}

fn request(purpose: &str, filename: &str, content_type: &str, size: i64) -> UploadInitRequest {
    UploadInitRequest {
        purpose: purpose.to_string(),
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        size_bytes: size,
        is_public: false,
        destination_hint: None,
        title: None,
        alt_text: None,
        tags: Vec::new(),
    }
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_resume_upload_end_to_end() {
    let h = Harness::new(MemoryStorage::new(private_caps()));
    let owner = UserUid::new("owner-1");

    let mut req = request("resume", "C:\\docs\\My CV.pdf", "Application/PDF; charset=binary", 2048);
    req.title = Some("  Curriculum  ".to_string());
    req.tags = vec!["cv".to_string(), " cv ".to_string(), "2024".to_string()];
    let init = h
        .service
        .upload_init(req, Some(owner.clone()), Some(owner.clone()))
        .await
        .unwrap();

    assert!(init.mode.is_direct());
    assert_eq!(init.file.status, UploadStatus::Pending);
    assert_eq!(init.file.original_filename, "My CV.pdf");
    assert_eq!(init.file.mime_type, "application/pdf");
    assert_eq!(init.file.title.as_deref(), Some("Curriculum"));
    assert_eq!(init.file.tags, vec!["cv", "2024"]);
    assert_eq!(init.file.storage_location, "memory");
    assert_eq!(
        init.object,
        format!("uploads/resume/{}/My_CV.pdf", init.file.uid)
    );
    match &init.mode {
        UploadMode::Direct { upload } => assert_eq!(upload.method, "PUT"),
        UploadMode::Proxied => panic!("expected a direct upload"),
    }

    h.storage
        .insert(init.file.storage_ref().unwrap(), PDF_BODY, Some("application/pdf"));
    let row = h
        .service
        .upload_finalize(UploadFinalizeRequest {
            file_uid: init.file.uid.clone(),
            object: init.object.clone(),
        })
        .await
        .unwrap();

    assert_eq!(row.status, UploadStatus::Ready);
    assert_eq!(row.byte_size, PDF_BODY.len() as u64);
    assert_eq!(row.sha256, None);
    assert_eq!(row.owner_user_uid, Some(owner));
    assert_eq!(h.hook.actions(), vec![WriteAction::Upload]);
}

#[tokio::test]
async fn test_upload_init_rejections() {
    let h = Harness::new(MemoryStorage::default());

    let err = h
        .service
        .upload_init(request("resume", "cv.exe", "application/pdf", 10), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Policy(_)));

    let err = h
        .service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 0), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));

    let mut hinted = request("resume", "cv.pdf", "application/pdf", 10);
    hinted.destination_hint = Some("secret-bucket".to_string());
    let err = h.service.upload_init(hinted, None, None).await.unwrap_err();
    assert!(matches!(err, FmError::Policy(_)));

    assert_eq!(h.connector.file_count(), 0);
    assert!(h.storage.calls().is_empty());
}

#[tokio::test]
async fn test_upload_init_bucket_selection() {
    let config = FmConfig::default().with_purpose_bucket("avatar", "media");
    let h = Harness::with_config(MemoryStorage::default(), config);

    let init = h
        .service
        .upload_init(request("avatar", "me.png", "image/png", 10), None, None)
        .await
        .unwrap();
    assert!(init.object.starts_with("media/avatar/"));

    let mut hinted = request("avatar", "me.png", "image/png", 10);
    hinted.destination_hint = Some(" private ".to_string());
    let init = h.service.upload_init(hinted, None, None).await.unwrap();
    assert!(init.object.starts_with("private/avatar/"));
}

#[tokio::test]
async fn test_upload_forced_public_without_private_serving() {
    let caps = StorageCapabilities {
        write_object: true,
        head_object: true,
        delete_object: true,
        ..StorageCapabilities::default()
    };
    let h = Harness::new(MemoryStorage::new(caps));

    let init = h
        .service
        .upload_init(request("image", "a.png", "image/png", 10), None, None)
        .await
        .unwrap();
    assert!(init.file.is_public);
    assert_eq!(init.mode, UploadMode::Proxied);
}

#[tokio::test]
async fn test_upload_init_without_upload_path_fails() {
    let caps = StorageCapabilities {
        head_object: true,
        presign_get: true,
        ..StorageCapabilities::default()
    };
    let h = Harness::new(MemoryStorage::new(caps));
    let err = h
        .service
        .upload_init(request("image", "a.png", "image/png", 10), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Storage(_)));
    assert_eq!(h.connector.file_count(), 0);
}

#[tokio::test]
async fn test_finalize_checks() {
    let h = Harness::new(MemoryStorage::default());
    let init = h
        .service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 16), None, None)
        .await
        .unwrap();
    let finalize = || UploadFinalizeRequest {
        file_uid: init.file.uid.clone(),
        object: init.object.clone(),
    };

    // Object not uploaded yet.
    let err = h.service.upload_finalize(finalize()).await.unwrap_err();
    assert!(matches!(err, FmError::NotFound(_)));

    // Someone else's object.
    let err = h
        .service
        .upload_finalize(UploadFinalizeRequest {
            file_uid: init.file.uid.clone(),
            object: "uploads/other".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));

    // Larger than declared.
    let target = init.file.storage_ref().unwrap();
    h.storage.insert(target.clone(), PDF_BODY, None);
    let err = h.service.upload_finalize(finalize()).await.unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));

    // Content is a PNG, which a resume may not be.
    h.storage.insert(target, png(1, 1)[..16].to_vec(), None);
    let err = h.service.upload_finalize(finalize()).await.unwrap_err();
    assert!(matches!(err, FmError::Policy(_)));

    let row = h.service.get_file(&init.file.uid).await.unwrap();
    assert_eq!(row.status, UploadStatus::Pending);
    assert!(h.hook.actions().is_empty());
}

#[tokio::test]
async fn test_finalize_corrects_mime_within_policy() {
    let h = Harness::new(MemoryStorage::default());
    let init = h
        .service
        .upload_init(request("image", "pic.jpg", "image/jpeg", 1024), None, None)
        .await
        .unwrap();
    h.storage
        .insert(init.file.storage_ref().unwrap(), png(4, 4), None);

    let row = h
        .service
        .upload_finalize(UploadFinalizeRequest {
            file_uid: init.file.uid.clone(),
            object: init.object,
        })
        .await
        .unwrap();
    assert_eq!(row.mime_type, "image/png");
}

#[tokio::test]
async fn test_proxied_write_and_finalize() {
    let h = Harness::new(MemoryStorage::new(proxied_caps()));
    let init = h
        .service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 4096), None, None)
        .await
        .unwrap();
    assert_eq!(init.mode, UploadMode::Proxied);

    let row = h
        .service
        .upload_write_and_finalize(&init.file.uid, Bytes::from_static(PDF_BODY), None)
        .await
        .unwrap();

    assert_eq!(row.status, UploadStatus::Ready);
    assert_eq!(row.sha256, Some(hex::encode(Sha256::digest(PDF_BODY))));
    assert_eq!(
        h.storage.object(&init.file.storage_ref().unwrap()).as_deref(),
        Some(PDF_BODY)
    );
}

#[tokio::test]
async fn test_proxied_write_failure_cleans_up() {
    let h = Harness::new(MemoryStorage::new(proxied_caps()).with_failing_writes());
    let init = h
        .service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 4096), None, None)
        .await
        .unwrap();
    let target = init.file.storage_ref().unwrap();

    let err = h
        .service
        .upload_write_and_finalize(&init.file.uid, Bytes::from_static(PDF_BODY), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FmError::Storage(_)));
    assert_eq!(
        h.storage.calls(),
        vec![StorageCall::Write(target.clone()), StorageCall::Delete(target)]
    );
    assert_eq!(h.storage.object_count(), 0);
    let row = h.service.get_file(&init.file.uid).await.unwrap();
    assert_eq!(row.status, UploadStatus::Pending);
}

#[tokio::test]
async fn test_proxied_write_rejects_oversized_body() {
    let h = Harness::new(MemoryStorage::new(proxied_caps()));
    let init = h
        .service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 8), None, None)
        .await
        .unwrap();

    let err = h
        .service
        .upload_write_and_finalize(&init.file.uid, Bytes::from_static(PDF_BODY), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
    assert!(h.storage.calls().is_empty());
}

// ============================================================================
// Variants
// ============================================================================

#[tokio::test]
async fn test_variant_dimension_cross_check() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;

    let variant = h.add_variant(&file, VariantKind::Thumb, &png(200, 100)).await;
    let err = h
        .service
        .variant_upload_finalize(VariantUploadFinalizeRequest {
            variant_uid: variant.uid.clone(),
            object: variant.storage_key.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));

    let variant = h.add_variant(&file, VariantKind::Thumb, &png(101, 99)).await;
    let row = h
        .service
        .variant_upload_finalize(VariantUploadFinalizeRequest {
            variant_uid: variant.uid.clone(),
            object: variant.storage_key.clone(),
        })
        .await
        .unwrap();
    assert_eq!(row.status, UploadStatus::Ready);
    assert_eq!(row.mime_type, "image/png");
    assert!(
        row.storage_key
            .starts_with(&format!("uploads/image/{}/variants/thumb-", file.uid))
    );
    assert!(row.storage_key.ends_with(".png"));
    assert_eq!(
        h.hook.actions(),
        vec![WriteAction::Upload, WriteAction::VariantUpload]
    );
}

#[tokio::test]
async fn test_variant_exact_dimensions_with_zero_tolerance() {
    let config = FmConfig::default().with_pixel_tolerance(0);
    let h = Harness::with_config(MemoryStorage::default(), config);
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;

    let variant = h.add_variant(&file, VariantKind::Preview, &png(100, 101)).await;
    let err = h
        .service
        .variant_upload_finalize(VariantUploadFinalizeRequest {
            variant_uid: variant.uid.clone(),
            object: variant.storage_key.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
}

#[tokio::test]
async fn test_variant_rejects_non_image_content() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;
    let variant = h.add_variant(&file, VariantKind::Thumb, PDF_BODY).await;

    let err = h
        .service
        .variant_upload_finalize(VariantUploadFinalizeRequest {
            variant_uid: variant.uid.clone(),
            object: variant.storage_key.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
}

#[tokio::test]
async fn test_variant_init_validation() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;
    let base = VariantUploadInitRequest {
        file_uid: file.uid.clone(),
        variant_kind: VariantKind::Thumb,
        content_type: "image/png".to_string(),
        size_bytes: 100,
        width: 100,
        height: 100,
    };

    let cases = [
        VariantUploadInitRequest { width: 0, ..base.clone() },
        VariantUploadInitRequest { width: 513, ..base.clone() },
        VariantUploadInitRequest { size_bytes: 0, ..base.clone() },
        VariantUploadInitRequest { content_type: "video/mp4".to_string(), ..base.clone() },
    ];
    for case in cases {
        let err = h.service.variant_upload_init(case).await.unwrap_err();
        assert!(matches!(err, FmError::Validation(_)), "{err}");
    }

    h.service.archive_file(&file.uid, None).await.unwrap();
    let err = h.service.variant_upload_init(base).await.unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
    assert_eq!(h.connector.variant_count(), 0);
}

#[tokio::test]
async fn test_proxied_variant_write() {
    let h = Harness::new(MemoryStorage::new(proxied_caps()));
    let init = h
        .service
        .upload_init(request("image", "photo.png", "image/png", 4096), None, None)
        .await
        .unwrap();
    let body = png(640, 480);
    h.service
        .upload_write_and_finalize(&init.file.uid, Bytes::from(body), None)
        .await
        .unwrap();

    let variant = h
        .service
        .variant_upload_init(VariantUploadInitRequest {
            file_uid: init.file.uid.clone(),
            variant_kind: VariantKind::Thumb,
            content_type: "image/png".to_string(),
            size_bytes: 1024,
            width: 320,
            height: 240,
        })
        .await
        .unwrap();
    assert_eq!(variant.mode, UploadMode::Proxied);

    let row = h
        .service
        .variant_write_and_finalize(&variant.variant.uid, Bytes::from(png(320, 240)), None)
        .await
        .unwrap();
    assert_eq!(row.status, UploadStatus::Ready);
    assert_eq!(h.service.list_variants(&init.file.uid).await.unwrap().len(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_archive_and_restore_are_idempotent() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    let before = h.update_count(&file.uid);

    let archived = h.service.archive_file(&file.uid, None).await.unwrap();
    assert!(archived.is_archived());
    let again = h.service.archive_file(&file.uid, None).await.unwrap();
    assert_eq!(again.lifecycle, archived.lifecycle);
    assert_eq!(h.update_count(&file.uid), before + 1);

    let restored = h.service.restore_file(&file.uid, None).await.unwrap();
    assert!(!restored.is_archived());
    h.service.restore_file(&file.uid, None).await.unwrap();
    assert_eq!(h.update_count(&file.uid), before + 2);

    assert_eq!(
        h.hook.actions(),
        vec![WriteAction::Upload, WriteAction::Archive, WriteAction::Restore]
    );
}

#[tokio::test]
async fn test_delete_linked_file_archives() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    for uid in ["p1", "p2", "p3"] {
        h.link(&file, uid).await;
    }
    h.storage.clear_calls();

    let outcome = h
        .service
        .delete_file(&file.uid, DeleteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, DeleteOutcome::Archived { link_count: 3 });
    assert!(h.deletes().is_empty());
    assert!(!h.connector.ops().contains(&ConnectorOp::DeleteFile(file.uid.clone())));
    assert!(h.service.get_file(&file.uid).await.unwrap().is_archived());
}

#[tokio::test]
async fn test_force_delete_requires_admin() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    h.link(&file, "p1").await;

    let err = h
        .service
        .delete_file(
            &file.uid,
            DeleteOptions {
                force: true,
                ..DeleteOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Authorization(_)));
    assert!(!h.service.get_file(&file.uid).await.unwrap().is_archived());

    let outcome = h
        .service
        .delete_file(
            &file.uid,
            DeleteOptions {
                force: true,
                is_admin: true,
                user_uid: Some(UserUid::new("admin")),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted { deleted_objects: 1 });
    assert_eq!(h.connector.file_count(), 0);
}

#[tokio::test]
async fn test_delete_removes_variant_objects_first() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;
    let thumb = h.add_variant(&file, VariantKind::Thumb, &png(100, 100)).await;
    let preview = h.add_variant(&file, VariantKind::Preview, &png(100, 100)).await;
    h.storage.clear_calls();
    h.connector.clear_ops();

    let outcome = h
        .service
        .delete_file(&file.uid, DeleteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted { deleted_objects: 3 });
    let deletes = h.deletes();
    assert_eq!(deletes.len(), 3);
    assert!(deletes[..2].contains(&thumb.storage_ref().unwrap()));
    assert!(deletes[..2].contains(&preview.storage_ref().unwrap()));
    assert_eq!(deletes[2], file.storage_ref().unwrap());
    assert_eq!(
        h.connector.ops(),
        vec![
            ConnectorOp::DeleteVariants(file.uid.clone()),
            ConnectorOp::DeleteFile(file.uid.clone()),
        ]
    );
    assert_eq!(h.storage.object_count(), 0);
    assert_eq!(h.connector.variant_count(), 0);
}

#[tokio::test]
async fn test_delete_keeps_rows_when_storage_fails() {
    let h = Harness::new(MemoryStorage::default().with_failing_deletes());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    h.connector.clear_ops();

    let err = h
        .service
        .delete_file(&file.uid, DeleteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Storage(_)));
    assert!(h.connector.ops().is_empty());
    assert_eq!(h.connector.file_count(), 1);
}

// ============================================================================
// Move
// ============================================================================

#[tokio::test]
async fn test_move_to_disallowed_bucket_touches_nothing() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    h.storage.clear_calls();
    h.connector.clear_ops();

    let err = h
        .service
        .move_file(
            &file.uid,
            MoveRequest {
                to_bucket: Some("not-a-preset".to_string()),
                to_folder_path: None,
            },
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FmError::Policy(_)));
    assert!(h.storage.calls().is_empty());
    assert!(h.connector.ops().is_empty());
}

#[tokio::test]
async fn test_move_relocates_file_and_variants() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(800, 600)).await;
    let thumb = h.add_variant(&file, VariantKind::Thumb, &png(100, 100)).await;

    let moved = h
        .service
        .move_file(
            &file.uid,
            MoveRequest {
                to_bucket: Some("media".to_string()),
                to_folder_path: Some("/gallery/2024/".to_string()),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        moved.storage_key,
        format!("media/gallery/2024/{}/photo.png", file.uid)
    );
    let variants = h.service.list_variants(&file.uid).await.unwrap();
    let new_thumb = variants[0].storage_ref().unwrap();
    assert_eq!(new_thumb.bucket, "media");
    assert!(new_thumb.object_key.starts_with(&format!("gallery/2024/{}/variants/", file.uid)));

    assert!(h.storage.object(&moved.storage_ref().unwrap()).is_some());
    assert!(h.storage.object(&new_thumb).is_some());
    assert!(h.storage.object(&file.storage_ref().unwrap()).is_none());
    assert!(h.storage.object(&thumb.storage_ref().unwrap()).is_none());
    assert_eq!(h.hook.actions().last(), Some(&WriteAction::Move));
}

#[tokio::test]
async fn test_move_in_place_is_noop() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    h.storage.clear_calls();

    let row = h
        .service
        .move_file(
            &file.uid,
            MoveRequest {
                to_bucket: Some("uploads".to_string()),
                to_folder_path: Some("resume".to_string()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(row, file);
    assert!(h.storage.calls().is_empty());
}

struct LocalHarness {
    _dir: tempfile::TempDir,
    service: FmService<MemoryConnector>,
    connector: Arc<MemoryConnector>,
    storage: Arc<LocalStorage>,
}

impl LocalHarness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("data")));
        let connector = Arc::new(MemoryConnector::new());
        let handle: StorageHandle = storage.clone();
        let service = FmService::new(FmConfig::default(), Arc::clone(&connector), handle);
        Self {
            _dir: dir,
            service,
            connector,
            storage,
        }
    }

    /// Writes a 640x480 image with a 320x240 thumb through the proxied path.
    async fn image_with_thumb(&self) -> (FileRow, VariantRow) {
        let init = self
            .service
            .upload_init(request("image", "photo.png", "image/png", 4096), None, None)
            .await
            .unwrap();
        let file = self
            .service
            .upload_write_and_finalize(&init.file.uid, Bytes::from(png(640, 480)), None)
            .await
            .unwrap();
        let variant = self
            .service
            .variant_upload_init(VariantUploadInitRequest {
                file_uid: file.uid.clone(),
                variant_kind: VariantKind::Thumb,
                content_type: "image/png".to_string(),
                size_bytes: 1024,
                width: 320,
                height: 240,
            })
            .await
            .unwrap();
        let thumb = self
            .service
            .variant_write_and_finalize(&variant.variant.uid, Bytes::from(png(320, 240)), None)
            .await
            .unwrap();
        (file, thumb)
    }

    async fn content(&self, target: &StorageRef) -> Vec<u8> {
        self.storage
            .read_object_range(target, 0, 4096)
            .await
            .unwrap()
            .to_vec()
    }
}

fn to_folder(folder: &str) -> MoveRequest {
    MoveRequest {
        to_bucket: None,
        to_folder_path: Some(folder.to_string()),
    }
}

#[tokio::test]
async fn test_move_retry_after_variant_already_relocated() {
    let h = LocalHarness::new();
    let (file, thumb) = h.image_with_thumb().await;
    let thumb_from = thumb.storage_ref().unwrap();
    let thumb_to = relocate(&thumb_from, &file.uid, None, Some("gallery"));

    // An earlier attempt copied the thumb and persisted its key, then stopped.
    h.storage.copy_object(&thumb_from, &thumb_to).await.unwrap();
    h.connector
        .update_variant_by_uid(
            &thumb.uid,
            VariantPatch {
                storage_key: Some(thumb_to.encode().unwrap()),
                ..VariantPatch::default()
            },
        )
        .await
        .unwrap();

    let moved = h
        .service
        .move_file(&file.uid, to_folder("gallery"), None)
        .await
        .unwrap();

    let destination = relocate(&file.storage_ref().unwrap(), &file.uid, None, Some("gallery"));
    assert_eq!(moved.storage_ref().unwrap(), destination);
    assert_eq!(h.content(&destination).await, png(640, 480));
    assert_eq!(h.content(&thumb_to).await, png(320, 240));
    assert!(!h.storage.head_object(&file.storage_ref().unwrap()).await.unwrap().exists);

    let variants = h.service.list_variants(&file.uid).await.unwrap();
    assert_eq!(variants[0].storage_ref().unwrap(), thumb_to);
}

#[tokio::test]
async fn test_repeated_move_on_local_storage_keeps_content() {
    let h = LocalHarness::new();
    let (file, thumb) = h.image_with_thumb().await;

    let first = h
        .service
        .move_file(&file.uid, to_folder("gallery"), None)
        .await
        .unwrap();
    let again = h
        .service
        .move_file(&file.uid, to_folder("gallery"), None)
        .await
        .unwrap();
    assert_eq!(again, first);

    let thumb_to = relocate(&thumb.storage_ref().unwrap(), &file.uid, None, Some("gallery"));
    assert_eq!(h.content(&first.storage_ref().unwrap()).await, png(640, 480));
    assert_eq!(h.content(&thumb_to).await, png(320, 240));
    assert!(!h.storage.head_object(&thumb.storage_ref().unwrap()).await.unwrap().exists);
}

#[tokio::test]
async fn test_move_archived_file_rejected() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    h.service.archive_file(&file.uid, None).await.unwrap();
    h.storage.clear_calls();

    let err = h
        .service
        .move_file(&file.uid, MoveRequest { to_bucket: Some("media".into()), to_folder_path: None }, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
    assert!(h.storage.calls().is_empty());
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_read_url_tiers() {
    // Public tier.
    let h = Harness::new(MemoryStorage::new(StorageCapabilities::all()));
    let mut req = request("image", "a.png", "image/png", 1024);
    req.is_public = true;
    let init = h.service.upload_init(req, None, None).await.unwrap();
    let url = h
        .service
        .resolve_read_url(&init.file.uid, ReadUrlOptions::default())
        .await
        .unwrap();
    assert_eq!(url.kind, ReadUrlKind::Public);
    assert_eq!(url.url, format!("https://public.memory.test/{}", init.object));
    assert_eq!(url.expires_at, None);

    // Signed tier for private files.
    let private = h
        .service
        .upload_init(request("image", "b.png", "image/png", 1024), None, None)
        .await
        .unwrap();
    let url = h
        .service
        .resolve_read_url(
            &private.file.uid,
            ReadUrlOptions {
                variant_kind: None,
                expires_in_seconds: Some(60),
            },
        )
        .await
        .unwrap();
    assert_eq!(url.kind, ReadUrlKind::Signed);
    assert!(url.url.starts_with("memory://"));
    assert!(url.expires_at.is_some());

    // Canonical tier when nothing else is available.
    let h = Harness::new(MemoryStorage::new(proxied_caps_without_presign_get()));
    let init = h
        .service
        .upload_init(request("image", "c.png", "image/png", 1024), None, None)
        .await
        .unwrap();
    let url = h
        .service
        .resolve_read_url(
            &init.file.uid,
            ReadUrlOptions {
                variant_kind: Some(VariantKind::Thumb),
                expires_in_seconds: None,
            },
        )
        .await;
    assert!(matches!(url, Err(FmError::NotFound(_))));
    let url = h
        .service
        .resolve_read_url(&init.file.uid, ReadUrlOptions::default())
        .await
        .unwrap();
    assert_eq!(url.kind, ReadUrlKind::Canonical);
    assert_eq!(url.url, format!("/api/admin/fm/files/{}/content", init.file.uid));
}

fn proxied_caps_without_presign_get() -> StorageCapabilities {
    StorageCapabilities {
        presign_get: false,
        ..proxied_caps()
    }
}

#[tokio::test]
async fn test_content_access_local_path() {
    let dir = tempfile::tempdir().unwrap();
    let storage: StorageHandle = Arc::new(LocalStorage::new(dir.path()));
    let service = FmService::new(
        FmConfig::default(),
        Arc::new(MemoryConnector::new()),
        storage,
    );

    let init = service
        .upload_init(request("resume", "cv.pdf", "application/pdf", 4096), None, None)
        .await
        .unwrap();
    assert_eq!(init.mode, UploadMode::Proxied);
    service
        .upload_write_and_finalize(&init.file.uid, Bytes::from_static(PDF_BODY), None)
        .await
        .unwrap();

    match service
        .resolve_content_access(&init.file.uid, None)
        .await
        .unwrap()
    {
        ContentAccess::LocalPath(path) => {
            assert!(path.starts_with(dir.path()));
            assert_eq!(std::fs::read(path).unwrap(), PDF_BODY);
        }
        ContentAccess::Redirect(url) => panic!("unexpected redirect to {url}"),
    }

    let head = service
        .get_storage_object_metadata(&init.file.uid)
        .await
        .unwrap();
    assert_eq!(head.size_bytes, Some(PDF_BODY.len() as u64));
}

#[tokio::test]
async fn test_content_access_redirects_on_object_storage() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;
    let access = h.service.resolve_content_access(&file.uid, None).await.unwrap();
    assert!(matches!(access, ContentAccess::Redirect(url) if url.starts_with("memory://")));
}

// ============================================================================
// Links and metadata
// ============================================================================

#[tokio::test]
async fn test_link_lifecycle() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;

    let err = h
        .service
        .create_link(NewLink {
            file_uid: file.uid.clone(),
            linked_entity_type: " ".to_string(),
            linked_entity_uid: "p1".to_string(),
            linked_field: None,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));

    let err = h
        .service
        .create_link(NewLink {
            file_uid: FileUid::new("missing"),
            linked_entity_type: "post".to_string(),
            linked_entity_uid: "p1".to_string(),
            linked_field: None,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FmError::NotFound(_)));

    let link = h.link(&file, "p1").await;
    assert_eq!(h.service.list_links_for_file(&file.uid).await.unwrap().len(), 1);
    assert_eq!(
        h.service
            .list_links_for_entity("post", "p1", Some("body"))
            .await
            .unwrap(),
        vec![link.clone()]
    );

    assert!(h.service.delete_link(&link.id, None).await.unwrap());
    assert!(!h.service.delete_link(&link.id, None).await.unwrap());
    assert_eq!(
        h.hook.actions(),
        vec![WriteAction::Upload, WriteAction::LinkCreate, WriteAction::LinkDelete]
    );
}

#[tokio::test]
async fn test_patch_file() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("image", "photo.png", "image/png", &png(8, 8)).await;
    let before = h.connector.ops().len();

    let noop = h
        .service
        .patch_file(&file.uid, FileUpdate::default(), None)
        .await
        .unwrap();
    assert!(noop.is_none());
    assert_eq!(h.connector.ops().len(), before);
    assert_eq!(h.hook.actions(), vec![WriteAction::Upload]);

    let row = h
        .service
        .patch_file(
            &file.uid,
            FileUpdate {
                title: Some(Some(" Sunset ".to_string())),
                alt_text: Some(None),
                tags: Some(vec!["beach".to_string(), "".to_string()]),
                is_public: Some(true),
            },
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.title.as_deref(), Some("Sunset"));
    assert_eq!(row.alt_text, None);
    assert_eq!(row.tags, vec!["beach"]);
    assert!(row.is_public);
    assert_eq!(h.hook.actions().last(), Some(&WriteAction::Patch));
}

#[tokio::test]
async fn test_rename_file() {
    let h = Harness::new(MemoryStorage::default());
    let file = h.ready_file("resume", "cv.pdf", "application/pdf", PDF_BODY).await;

    let row = h
        .service
        .rename_file(&file.uid, " cv-final.PDF ", None)
        .await
        .unwrap();
    assert_eq!(row.original_filename, "cv-final.PDF");
    assert_eq!(row.storage_key, file.storage_key);

    let err = h.service.rename_file(&file.uid, "cv.exe", None).await.unwrap_err();
    assert!(matches!(err, FmError::Policy(_)));
    let err = h.service.rename_file(&file.uid, "a/b.pdf", None).await.unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
    let err = h.service.rename_file(&file.uid, "  ", None).await.unwrap_err();
    assert!(matches!(err, FmError::Validation(_)));
}

#[tokio::test]
async fn test_hook_failure_is_swallowed() {
    let storage: StorageHandle = Arc::new(MemoryStorage::default());
    let connector = Arc::new(MemoryConnector::new());
    let service = FmService::new(FmConfig::default(), Arc::clone(&connector), storage)
        .with_write_hook(Arc::new(FailingHook));

    let init = service
        .upload_init(request("image", "a.png", "image/png", 1024), None, None)
        .await
        .unwrap();
    let archived = service.archive_file(&init.file.uid, None).await.unwrap();
    assert!(archived.is_archived());
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let h = Harness::new(MemoryStorage::default());
    let missing = FileUid::new("nope");
    assert!(matches!(h.service.get_file(&missing).await, Err(FmError::NotFound(_))));
    assert!(matches!(
        h.service.archive_file(&missing, None).await,
        Err(FmError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete_file(&missing, DeleteOptions::default()).await,
        Err(FmError::NotFound(_))
    ));
}
