//! Link table reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use fm_shared::FmResult;
use fm_shared::types::{FileUid, LinkId, UserUid};
use serde::Serialize;
use tracing::{debug, warn};

use crate::connector::{FmConnector, NewLink};
use crate::fm::FmService;

/// Links changed by a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Files newly linked.
    pub created: Vec<FileUid>,
    /// Files no longer linked.
    pub removed: Vec<FileUid>,
}

impl ReconcileOutcome {
    /// Returns true when no link changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Makes the links held by one entity field match `desired`.
///
/// Links are created for desired files that are not linked yet and deleted for
/// linked files that are no longer desired. A link that cannot be created, for
/// example because the file was deleted meanwhile, is logged and left out of
/// the outcome. Concurrent reconciliations of the same field are not
/// serialized; the last one wins.
///
/// # Errors
///
/// Returns connector errors from listing or deleting links.
pub async fn reconcile_fm_links<C: FmConnector>(
    service: &FmService<C>,
    entity_type: &str,
    entity_uid: &str,
    desired: &[FileUid],
    field: Option<&str>,
    actor: Option<&UserUid>,
) -> FmResult<ReconcileOutcome> {
    let mut current: BTreeMap<FileUid, Vec<LinkId>> = BTreeMap::new();
    for link in service
        .list_links_for_entity(entity_type, entity_uid, field)
        .await?
        .into_iter()
        .filter(|link| link.linked_field.as_deref() == field)
    {
        current.entry(link.file_uid).or_default().push(link.id);
    }
    let desired: BTreeSet<&FileUid> = desired.iter().collect();

    let mut outcome = ReconcileOutcome::default();
    for uid in desired.iter().filter(|uid| !current.contains_key(**uid)) {
        let link = NewLink {
            file_uid: (*uid).clone(),
            linked_entity_type: entity_type.to_string(),
            linked_entity_uid: entity_uid.to_string(),
            linked_field: field.map(String::from),
            created_by: actor.cloned(),
        };
        match service.create_link(link).await {
            Ok(_) => outcome.created.push((*uid).clone()),
            Err(e) => {
                warn!(file_uid = %uid, entity_uid, error = %e, "Failed to create link");
            }
        }
    }

    for (uid, ids) in current {
        if desired.contains(&uid) {
            continue;
        }
        for id in &ids {
            service.delete_link(id, actor).await?;
        }
        outcome.removed.push(uid);
    }

    debug!(
        entity_type,
        entity_uid,
        created = outcome.created.len(),
        removed = outcome.removed.len(),
        "Links reconciled"
    );
    Ok(outcome)
}
