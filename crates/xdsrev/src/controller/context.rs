use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ControllerSpec;
use crate::loader::ResourceLoader;
use crate::secrets::SecretStore;
use crate::snapshot::SnapshotCache;
use crate::store::RecordStore;

/// Collaborators and settings shared by every reconcile.
pub struct Context {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<dyn SnapshotCache>,
    pub loader: ResourceLoader,
    pub max_revisions: usize,
    pub taint_on_rejection: bool,
    /// Serializes snapshot writes per node across revision reconciles.
    node_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Context {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn SnapshotCache>,
        secrets: Arc<dyn SecretStore>,
        spec: &ControllerSpec,
    ) -> Self {
        Self {
            store,
            cache,
            loader: ResourceLoader::new(secrets),
            max_revisions: spec.max_revisions.max(1),
            taint_on_rejection: spec.taint_on_rejection,
            node_locks: DashMap::new(),
        }
    }

    /// Holds the snapshot slot of `node_id` until the guard drops.
    ///
    /// Two revisions of one node are distinct work items, so the queue alone
    /// lets them run at once. Whoever writes the node's snapshot must read
    /// the revision's publication state after taking this lock.
    pub async fn lock_node(&self, node_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .node_locks
            .entry(node_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drops the lock entry of a node whose config is gone.
    pub fn forget_node(&self, node_id: &str) {
        self.node_locks
            .remove_if(node_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
