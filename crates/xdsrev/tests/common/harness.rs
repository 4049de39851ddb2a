//! Test harness for controller integration tests.
//!
//! The `TestHarness` wires a `Controller` to an in-memory SQLite store, an
//! in-memory snapshot cache and an in-memory secret store, and drives
//! reconciles on the test task until nothing is left to do.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use xdsrev::api::conditions::{set_condition, Condition, ConditionStatus, REVISION_TAINTED};
use xdsrev::api::{DesiredConfig, ObjectKey, Revision};
use xdsrev::config::ControllerSpec;
use xdsrev::controller::{Context, Controller, ReconcileError};
use xdsrev::secrets::{InMemorySecretStore, SecretData};
use xdsrev::snapshot::{InMemorySnapshotCache, Snapshot, SnapshotCache, SnapshotEvent};
use xdsrev::store::{RecordStore, SqliteStore, StoreEvent};

const MAX_STEPS: usize = 1_000;

pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<InMemorySnapshotCache>,
    pub secrets: Arc<InMemorySecretStore>,
    pub controller: Controller,
    events: broadcast::Receiver<StoreEvent>,
    secret_events: broadcast::Receiver<ObjectKey>,
    snapshot_events: broadcast::Receiver<SnapshotEvent>,
    /// Errors returned by reconciles during `drive`.
    pub errors: Vec<String>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_spec(ControllerSpec::default())
    }

    pub fn with_spec(spec: ControllerSpec) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().expect("Failed to open store"));
        let cache = Arc::new(InMemorySnapshotCache::default());
        let secrets = Arc::new(InMemorySecretStore::default());

        // Subscribe before anything is written
        let events = store.subscribe();
        let secret_events = secrets.subscribe();
        let snapshot_events = cache.subscribe();

        let ctx = Context::new(store.clone(), cache.clone(), secrets.clone(), &spec);
        let controller = Controller::new(Arc::new(ctx), &spec);

        Self {
            store,
            cache,
            secrets,
            controller,
            events,
            secret_events,
            snapshot_events,
            errors: Vec::new(),
        }
    }

    /// Creates the config, or replaces the spec of the stored one.
    pub async fn apply(&self, config: DesiredConfig) -> DesiredConfig {
        match self.store.get_config(&config.key()).await.unwrap() {
            Some(mut stored) => {
                stored.spec = config.spec;
                self.store.update_config(stored).await.unwrap()
            }
            None => self.store.create_config(config).await.unwrap(),
        }
    }

    pub async fn delete(&self, key: &ObjectKey) {
        self.store.delete_config(key).await.unwrap();
    }

    pub fn put_secret(&self, name: &str, cert: &[u8], key: &[u8]) {
        self.secrets.put(
            ObjectKey::new(super::NAMESPACE, name),
            SecretData::tls(cert.to_vec(), key.to_vec()),
        );
    }

    /// Feeds pending store and secret events to the controller and runs
    /// reconciles until the queue is empty. Returns the number of reconciles.
    pub async fn drive(&mut self) -> usize {
        let mut steps = 0;
        loop {
            self.pump_events().await;
            let Some(item) = self.controller.queue().try_next() else {
                break;
            };
            let result = self.controller.reconcile(&item).await;
            self.controller.queue().done(&item);
            if let Err(e) = result {
                self.errors.push(format!("{}: {}", item, e));
            }

            steps += 1;
            assert!(steps < MAX_STEPS, "reconciles did not converge");
        }
        steps
    }

    async fn pump_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.controller.handle_event(&event),
                Err(TryRecvError::Lagged(_)) => {
                    self.controller.resync_all().await.unwrap();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        loop {
            match self.secret_events.try_recv() {
                Ok(key) => {
                    self.controller.on_secret_changed(&key).await.unwrap();
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Number of snapshot pushes and clears since the last call.
    pub fn take_snapshot_events(&mut self) -> Vec<SnapshotEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.snapshot_events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn config(&self, key: &ObjectKey) -> Option<DesiredConfig> {
        self.store.get_config(key).await.unwrap()
    }

    pub async fn revisions(&self, node_id: &str) -> Vec<Revision> {
        self.store.list_revisions_for_node(node_id).await.unwrap()
    }

    pub async fn revision(&self, node_id: &str, version: &str) -> Revision {
        let mut found = self.store.find_revisions(node_id, version).await.unwrap();
        assert_eq!(found.len(), 1, "expected one revision at {}", version);
        found.remove(0)
    }

    pub async fn published_versions(&self, node_id: &str) -> Vec<String> {
        self.revisions(node_id)
            .await
            .into_iter()
            .filter(|r| r.is_published())
            .map(|r| r.version().to_string())
            .collect()
    }

    /// Taints a revision the way an operator or a failed load would.
    pub async fn taint(&self, node_id: &str, version: &str) {
        let mut revision = self.revision(node_id, version).await;
        set_condition(
            &mut revision.status.conditions,
            Condition::new(REVISION_TAINTED, ConditionStatus::True, "ManualTaint", ""),
        );
        revision.status.tainted = true;
        self.store.update_revision_status(&revision).await.unwrap();
    }

    pub fn snapshot(&self, node_id: &str) -> Option<Snapshot> {
        self.cache.get_snapshot(node_id)
    }

    pub async fn on_node_rejected(&self, node_id: &str) -> Result<(), ReconcileError> {
        self.controller.on_node_rejected(node_id).await
    }
}
