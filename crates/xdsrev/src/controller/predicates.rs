//! Watch filters deciding which store changes trigger a reconcile.
//!
//! Status writes made by the reconcilers themselves bump `resourceVersion`
//! on every pass; only the changes below re-enter a loop, so a pass does not
//! trigger itself.

use crate::api::conditions::{
    condition_status, ConditionStatus, RESOURCES_OUT_OF_SYNC, REVISION_PUBLISHED, REVISION_TAINTED,
};
use crate::api::{DesiredConfig, ObjectKey, Revision};
use crate::store::Change;

/// Create, delete, a spec change, or the start of deletion.
pub fn config_changed(change: &Change<DesiredConfig>) -> bool {
    match (&change.old, &change.new) {
        (None, Some(_)) | (Some(_), None) => true,
        (Some(old), Some(new)) => {
            old.metadata.generation != new.metadata.generation
                || (!old.metadata.is_deleting() && new.metadata.is_deleting())
        }
        (None, None) => false,
    }
}

/// Create, a spec change, or a flip of `RevisionPublished` or
/// `ResourcesOutOfSync`.
pub fn revision_changed(change: &Change<Revision>) -> bool {
    match (&change.old, &change.new) {
        (None, Some(_)) => true,
        (Some(old), Some(new)) => {
            old.metadata.generation != new.metadata.generation
                || status_flipped(old, new, REVISION_PUBLISHED)
                || status_flipped(old, new, RESOURCES_OUT_OF_SYNC)
        }
        _ => false,
    }
}

/// The owning DesiredConfig, when a revision's `RevisionTainted` flipped.
pub fn owner_to_requeue(change: &Change<Revision>) -> Option<ObjectKey> {
    let tainted = |r: Option<&Revision>| {
        r.map(|r| condition_status(&r.status.conditions, REVISION_TAINTED))
            .unwrap_or(ConditionStatus::Unknown)
    };
    if tainted(change.old.as_ref()) == tainted(change.new.as_ref()) {
        return None;
    }
    let revision = change.new.as_ref().or(change.old.as_ref())?;
    let owner = revision.metadata.controller_owner()?;
    Some(ObjectKey::new(revision.namespace(), owner.name.clone()))
}

fn status_flipped(old: &Revision, new: &Revision, condition_type: &str) -> bool {
    condition_status(&old.status.conditions, condition_type)
        != condition_status(&new.status.conditions, condition_type)
}
