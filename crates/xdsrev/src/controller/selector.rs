//! Picks the version to publish from a config's revision history.

use crate::api::DesiredConfig;
use crate::store::RecordStore;

use super::error::ReconcileError;

/// Returns the most recent version in the history whose revision is not
/// tainted.
///
/// History entries whose revision record is missing are skipped. Fails with
/// [`ReconcileError::AllRevisionsTainted`] when nothing qualifies.
pub async fn select_version(
    store: &dyn RecordStore,
    config: &DesiredConfig,
) -> Result<String, ReconcileError> {
    let node_id = config.node_id();
    let revisions = store.list_revisions_for_node(node_id).await?;

    for entry in config.status.revisions.iter().rev() {
        match revisions.iter().find(|r| r.version() == entry.version) {
            Some(revision) if revision.is_tainted() => {
                log::debug!("Skipping tainted version {} for node {}", entry.version, node_id);
            }
            Some(_) => return Ok(entry.version.clone()),
            None => {
                log::warn!(
                    "History of {} names version {} but revision {} is missing",
                    config.key(),
                    entry.version,
                    entry.revision
                );
            }
        }
    }

    Err(ReconcileError::AllRevisionsTainted {
        node_id: node_id.to_string(),
    })
}
