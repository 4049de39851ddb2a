//! The snapshot store a discovery server serves nodes from.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::envoy::ResourceType;

use super::Snapshot;

/// Per-node snapshot store. Every operation is an atomic, independent
/// operation on a single node id and may be called from many reconciles at once.
pub trait SnapshotCache: Send + Sync {
    fn get_snapshot(&self, node_id: &str) -> Option<Snapshot>;
    fn set_snapshot(&self, node_id: &str, snapshot: Snapshot);
    fn clear_snapshot(&self, node_id: &str);
}

/// Emitted whenever a node's snapshot is replaced or removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SnapshotEvent {
    #[serde(rename_all = "camelCase")]
    Updated {
        node_id: String,
        versions: BTreeMap<ResourceType, String>,
    },
    #[serde(rename_all = "camelCase")]
    Cleared { node_id: String },
}

/// In-process snapshot store backed by a sharded concurrent map.
pub struct InMemorySnapshotCache {
    snapshots: DashMap<String, Snapshot>,
    events: broadcast::Sender<SnapshotEvent>,
}

impl InMemorySnapshotCache {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            snapshots: DashMap::new(),
            events,
        }
    }

    /// Returns a receiver for snapshot change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.events.subscribe()
    }

    /// Node ids that currently have a snapshot.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn broadcast(&self, event: SnapshotEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for InMemorySnapshotCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SnapshotCache for InMemorySnapshotCache {
    fn get_snapshot(&self, node_id: &str) -> Option<Snapshot> {
        self.snapshots.get(node_id).map(|s| s.value().clone())
    }

    fn set_snapshot(&self, node_id: &str, snapshot: Snapshot) {
        let versions = snapshot.versions();
        self.snapshots.insert(node_id.to_string(), snapshot);
        log::debug!("Snapshot updated for node {}", node_id);
        self.broadcast(SnapshotEvent::Updated {
            node_id: node_id.to_string(),
            versions,
        });
    }

    fn clear_snapshot(&self, node_id: &str) {
        if self.snapshots.remove(node_id).is_some() {
            log::debug!("Snapshot cleared for node {}", node_id);
            self.broadcast(SnapshotEvent::Cleared {
                node_id: node_id.to_string(),
            });
        }
    }
}
