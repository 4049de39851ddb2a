//! Structural comparison of snapshots.

use crate::envoy::ResourceType;

use super::Snapshot;

/// Two snapshots are equal when every bucket holds the same names mapped to
/// structurally equal resources. Version labels are not compared, so a
/// version bump over identical content is not a change.
pub fn snapshots_equal(a: &Snapshot, b: &Snapshot) -> bool {
    ResourceType::all()
        .iter()
        .all(|t| a.resources(*t).items == b.resources(*t).items)
}
