//! Post-write notifications.

use std::fmt;

use async_trait::async_trait;
use fm_shared::error::BoxError;
use fm_shared::types::{FileUid, UserUid, VariantUid};
use serde::Serialize;

/// Mutation that triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    /// File upload finalized.
    Upload,
    /// Variant upload finalized.
    VariantUpload,
    /// File archived.
    Archive,
    /// File restored.
    Restore,
    /// File and its variants deleted.
    Delete,
    /// File moved to a new key.
    Move,
    /// Metadata edited.
    Patch,
    /// File renamed.
    Rename,
    /// Link created.
    LinkCreate,
    /// Link removed.
    LinkDelete,
}

impl WriteAction {
    /// Convert to the wire string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::VariantUpload => "variant_upload",
            Self::Archive => "archive",
            Self::Restore => "restore",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Patch => "patch",
            Self::Rename => "rename",
            Self::LinkCreate => "link_create",
            Self::LinkDelete => "link_delete",
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload passed to a [`WriteHook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteEvent {
    /// What happened.
    pub action: WriteAction,
    /// Affected file.
    pub file_uid: FileUid,
    /// Affected variant, for variant uploads.
    pub variant_uid: Option<VariantUid>,
    /// Acting user, when known.
    pub actor: Option<UserUid>,
}

/// Callback invoked after every committed mutation.
///
/// Failures are logged and never undo the mutation.
#[async_trait]
pub trait WriteHook: Send + Sync {
    /// Handles one event.
    async fn on_write(&self, event: &WriteEvent) -> Result<(), BoxError>;
}
