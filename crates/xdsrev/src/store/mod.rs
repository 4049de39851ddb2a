//! Durable record store holding DesiredConfig and Revision records.
//!
//! The store assigns uids, bumps `resourceVersion` on every write and
//! `generation` on spec changes, rejects writes based on stale copies, and
//! honours finalizers on delete. Every change is broadcast as a
//! [`StoreEvent`] so reconcilers can react to it.

pub mod error;
pub mod migrations;
pub mod sqlite;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::api::{DesiredConfig, ObjectKey, Revision, StoredObject};

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;

/// Before and after images of one record change. `old` is `None` on create,
/// `new` is `None` once the record is gone.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub old: Option<T>,
    pub new: Option<T>,
}

impl<T: StoredObject> Change<T> {
    pub fn key(&self) -> Option<ObjectKey> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|o| o.meta().key())
    }
}

#[derive(Debug, Clone)]
pub enum StoreEvent {
    DesiredConfig(Change<DesiredConfig>),
    Revision(Change<Revision>),
}

/// A stored kind that can be reported in a [`StoreEvent`].
pub trait Record: StoredObject {
    fn event(change: Change<Self>) -> StoreEvent;
}

impl Record for DesiredConfig {
    fn event(change: Change<Self>) -> StoreEvent {
        StoreEvent::DesiredConfig(change)
    }
}

impl Record for Revision {
    fn event(change: Change<Self>) -> StoreEvent {
        StoreEvent::Revision(change)
    }
}

/// CRUD, indexed lookup and change notification for engine records.
///
/// `update_*` writes spec and metadata and keeps the stored status;
/// `update_*_status` writes only the status. Both fail with
/// [`StoreError::Conflict`] when the given copy is stale.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_config(&self, key: &ObjectKey) -> Result<Option<DesiredConfig>>;
    async fn list_configs(&self) -> Result<Vec<DesiredConfig>>;
    async fn list_configs_for_node(&self, node_id: &str) -> Result<Vec<DesiredConfig>>;
    async fn create_config(&self, config: DesiredConfig) -> Result<DesiredConfig>;
    async fn update_config(&self, config: DesiredConfig) -> Result<DesiredConfig>;
    async fn update_config_status(&self, config: &DesiredConfig) -> Result<DesiredConfig>;
    /// Removes the record, or only marks it deleting while finalizers remain.
    async fn delete_config(&self, key: &ObjectKey) -> Result<()>;

    async fn get_revision(&self, key: &ObjectKey) -> Result<Option<Revision>>;
    async fn list_revisions(&self) -> Result<Vec<Revision>>;
    async fn list_revisions_for_node(&self, node_id: &str) -> Result<Vec<Revision>>;
    /// Revisions labelled with both `node_id` and `version`.
    async fn find_revisions(&self, node_id: &str, version: &str) -> Result<Vec<Revision>>;
    /// Revisions whose controlling owner has uid `owner_uid`.
    async fn list_owned_revisions(&self, owner_uid: &str) -> Result<Vec<Revision>>;
    /// Revisions whose `RevisionPublished` condition is true.
    async fn list_published_revisions(&self) -> Result<Vec<Revision>>;
    async fn create_revision(&self, revision: Revision) -> Result<Revision>;
    async fn update_revision_status(&self, revision: &Revision) -> Result<Revision>;
    async fn delete_revision(&self, key: &ObjectKey) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
