//! Content-lifecycle binding for link reconciliation.

use std::sync::Arc;

use fm_shared::FmResult;
use fm_shared::types::UserUid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::extract::extract_fm_file_uids;
use super::reconcile::{ReconcileOutcome, reconcile_fm_links};
use crate::connector::FmConnector;
use crate::fm::FmService;

/// Which content entity and field the tracker follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsLinkTrackerConfig {
    /// Entity type recorded on links.
    pub entity_type: String,
    /// Row field holding the rendered body.
    pub body_field: String,
    /// Field name recorded on links; the body field name when unset.
    pub linked_field: Option<String>,
}

impl Default for CmsLinkTrackerConfig {
    fn default() -> Self {
        Self {
            entity_type: "cms_content".to_string(),
            body_field: "body".to_string(),
            linked_field: None,
        }
    }
}

impl CmsLinkTrackerConfig {
    fn linked_field(&self) -> &str {
        self.linked_field.as_deref().unwrap_or(&self.body_field)
    }
}

/// Content lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEventKind {
    /// Entity created.
    Create,
    /// Entity edited.
    Update,
    /// Entity published.
    Publish,
    /// Entity restored from the trash.
    Restore,
    /// Entity deleted for good.
    Delete,
    /// Entity moved to the trash.
    Trash,
}

/// Notification sent after a content entity was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentWriteEvent {
    /// Transition.
    #[serde(rename = "type")]
    pub kind: ContentEventKind,
    /// Entity uid.
    pub uid: String,
    /// Entity row after the write.
    #[serde(default)]
    pub row: Option<serde_json::Value>,
    /// Acting user.
    #[serde(default)]
    pub actor_user_uid: Option<UserUid>,
}

/// Keeps the link table in step with a content entity's body.
pub struct CmsLinkTracker<C: FmConnector> {
    service: Arc<FmService<C>>,
    config: CmsLinkTrackerConfig,
}

/// Creates a tracker bound to `service`.
#[must_use]
pub fn create_cms_fm_link_tracker<C: FmConnector>(
    service: Arc<FmService<C>>,
    config: CmsLinkTrackerConfig,
) -> CmsLinkTracker<C> {
    CmsLinkTracker { service, config }
}

impl<C: FmConnector> CmsLinkTracker<C> {
    /// The tracker's configuration.
    #[must_use]
    pub fn config(&self) -> &CmsLinkTrackerConfig {
        &self.config
    }

    /// Handles a content write.
    ///
    /// Create, update, publish, and restore reconcile the body field's links.
    /// Delete removes every link the entity holds. Trash keeps links so a
    /// restore finds them. Returns `None` when nothing was reconciled, which
    /// includes bodies that are missing, empty, or not text.
    ///
    /// # Errors
    ///
    /// Returns connector errors from listing or deleting links.
    pub async fn on_after_write(
        &self,
        event: &ContentWriteEvent,
    ) -> FmResult<Option<ReconcileOutcome>> {
        let entity_type = self.config.entity_type.as_str();
        let actor = event.actor_user_uid.as_ref();

        match event.kind {
            ContentEventKind::Trash => Ok(None),
            ContentEventKind::Delete => {
                let links = self
                    .service
                    .list_links_for_entity(entity_type, &event.uid, None)
                    .await?;
                let mut outcome = ReconcileOutcome::default();
                for link in links {
                    self.service.delete_link(&link.id, actor).await?;
                    if !outcome.removed.contains(&link.file_uid) {
                        outcome.removed.push(link.file_uid);
                    }
                }
                info!(entity_type, entity_uid = %event.uid, removed = outcome.removed.len(), "Links removed for deleted content");
                Ok(Some(outcome))
            }
            ContentEventKind::Create
            | ContentEventKind::Update
            | ContentEventKind::Publish
            | ContentEventKind::Restore => {
                let Some(body) = event
                    .row
                    .as_ref()
                    .and_then(|row| row.get(&self.config.body_field))
                    .and_then(serde_json::Value::as_str)
                    .filter(|body| !body.trim().is_empty())
                else {
                    debug!(entity_type, entity_uid = %event.uid, "No text body; links untouched");
                    return Ok(None);
                };

                let desired = extract_fm_file_uids(body);
                let outcome = reconcile_fm_links(
                    &self.service,
                    entity_type,
                    &event.uid,
                    &desired,
                    Some(self.config.linked_field()),
                    actor,
                )
                .await?;
                Ok(Some(outcome))
            }
        }
    }
}
