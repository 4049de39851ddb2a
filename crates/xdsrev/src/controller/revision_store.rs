//! Revision bookkeeping: creation, history consolidation, publication flags
//! and garbage collection.

use crate::api::conditions::{set_condition, Condition, ConditionStatus, REVISION_PUBLISHED};
use crate::api::{DesiredConfig, Revision, RevisionRef};
use crate::store::{RecordStore, StoreError};

use super::error::ReconcileError;

/// Returns the single revision for the config's node at `version`, creating
/// it when absent. More than one match means the index is corrupt and is
/// reported instead of picking one.
pub async fn ensure_revision(
    store: &dyn RecordStore,
    config: &DesiredConfig,
    version: &str,
) -> Result<Revision, ReconcileError> {
    let node_id = config.node_id();
    let mut found = store.find_revisions(node_id, version).await?;
    match found.len() {
        0 => {
            let revision = store
                .create_revision(Revision::for_config(config, version))
                .await?;
            log::info!(
                "Created revision {} for node {} at version {}",
                revision.key(),
                node_id,
                version
            );
            Ok(revision)
        }
        1 => Ok(found.remove(0)),
        count => Err(ReconcileError::DuplicateRevisions {
            node_id: node_id.to_string(),
            version: version.to_string(),
            count,
        }),
    }
}

/// Makes `revision` the most recent history entry of `config`.
///
/// An entry already in the history moves to the tail; a new one is appended
/// and the history is trimmed from the head to `max_revisions`. Returns true
/// if the history changed.
pub fn consolidate(config: &mut DesiredConfig, revision: &Revision, max_revisions: usize) -> bool {
    let history = &mut config.status.revisions;
    let version = revision.version();

    if let Some(position) = history.iter().position(|r| r.version == version) {
        if position + 1 == history.len() {
            return false;
        }
        let entry = history.remove(position);
        history.push(entry);
        return true;
    }

    history.push(RevisionRef {
        version: version.to_string(),
        revision: revision.name().to_string(),
    });
    let excess = history.len().saturating_sub(max_revisions);
    if excess > 0 {
        history.drain(..excess);
    }
    true
}

/// Flags the revision at `version` as the published one for `node_id`.
///
/// Every other published revision of the node is cleared first, so an
/// interruption leaves zero published revisions rather than two.
pub async fn mark_published(
    store: &dyn RecordStore,
    node_id: &str,
    version: &str,
    reason: &str,
    message: &str,
) -> Result<Revision, ReconcileError> {
    let revisions = store.list_revisions_for_node(node_id).await?;
    let Some(target) = revisions.iter().find(|r| r.version() == version).cloned() else {
        return Err(ReconcileError::RevisionNotFound {
            node_id: node_id.to_string(),
            version: version.to_string(),
        });
    };

    for revision in revisions.iter().filter(|r| r.version() != version) {
        clear_published(store, revision, "Superseded", &format!("version {} is published", version))
            .await?;
    }

    let mut next = target.clone();
    let changed = set_condition(
        &mut next.status.conditions,
        Condition::new(REVISION_PUBLISHED, ConditionStatus::True, reason, message),
    );
    if !changed {
        return Ok(target);
    }
    let updated = store.update_revision_status(&next).await?;
    log::info!("Marked revision {} published for node {}", updated.key(), node_id);
    Ok(updated)
}

/// Clears the published flag on every revision of `node_id`.
pub async fn unpublish_all(
    store: &dyn RecordStore,
    node_id: &str,
    reason: &str,
    message: &str,
) -> Result<(), ReconcileError> {
    for revision in store.list_revisions_for_node(node_id).await? {
        clear_published(store, &revision, reason, message).await?;
    }
    Ok(())
}

async fn clear_published(
    store: &dyn RecordStore,
    revision: &Revision,
    reason: &str,
    message: &str,
) -> Result<(), ReconcileError> {
    if !revision.is_published() && !revision.status.published {
        return Ok(());
    }
    let mut next = revision.clone();
    set_condition(
        &mut next.status.conditions,
        Condition::new(REVISION_PUBLISHED, ConditionStatus::False, reason, message),
    );
    next.status.published = false;
    store.update_revision_status(&next).await?;
    log::debug!("Cleared published flag on revision {}", revision.key());
    Ok(())
}

/// Deletes revisions owned by `config` whose version left its history.
/// Failures are logged and left for a later pass. Returns the number of
/// revisions deleted.
pub async fn delete_unreferenced(store: &dyn RecordStore, config: &DesiredConfig) -> usize {
    let owned = match store.list_owned_revisions(&config.metadata.uid).await {
        Ok(owned) => owned,
        Err(e) => {
            log::warn!("Failed to list revisions of {}: {}", config.key(), e);
            return 0;
        }
    };

    let mut deleted = 0;
    for revision in owned {
        if config.status.history_position(revision.version()).is_some() {
            continue;
        }
        match store.delete_revision(&revision.key()).await {
            Ok(()) => {
                log::debug!("Deleted unreferenced revision {}", revision.key());
                deleted += 1;
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => log::warn!("Failed to delete revision {}: {}", revision.key(), e),
        }
    }
    deleted
}
