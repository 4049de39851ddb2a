//! Record types managed by the engine.
//!
//! Two stored kinds, both in the K8s envelope of [`Resource`]:
//! - `DesiredConfig`: the declared bundle for one node plus its revision history
//! - `Revision`: an immutable, content-addressed copy of one version of that bundle

pub mod conditions;
pub mod desired_config;
pub mod meta;
pub mod revision;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use conditions::{Condition, ConditionStatus};
pub use desired_config::{
    CacheState, DesiredConfig, DesiredConfigSpec, DesiredConfigStatus, EnvoyResource,
    EnvoyResources, EnvoySecretResource, RevisionRef, SecretReference, SerializationFormat,
};
pub use meta::{
    ObjectKey, ObjectMeta, OwnerReference, Resource, ResourceKind, API_VERSION, LABEL_NODE_ID,
    LABEL_VERSION, SNAPSHOT_FINALIZER,
};
pub use revision::{revision_name, Revision, RevisionSpec, RevisionStatus};

/// A record the store knows how to persist and index.
pub trait StoredObject: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    /// Value of the indexed node id column.
    fn index_node_id(&self) -> &str;
    /// Value of the indexed version column, if the kind has one.
    fn index_version(&self) -> Option<&str>;
    /// Value of the indexed published flag.
    fn index_published(&self) -> bool {
        false
    }
    /// Serialized spec, compared to decide whether the generation moves.
    fn spec_json(&self) -> serde_json::Result<String>;
    /// Copies status from `other`, leaving metadata and spec alone.
    fn take_status_from(&mut self, other: &Self);
}

impl StoredObject for DesiredConfig {
    const KIND: ResourceKind = ResourceKind::DesiredConfig;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn index_node_id(&self) -> &str {
        &self.spec.node_id
    }

    fn index_version(&self) -> Option<&str> {
        None
    }

    fn spec_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.spec)
    }

    fn take_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}

impl StoredObject for Revision {
    const KIND: ResourceKind = ResourceKind::Revision;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn index_node_id(&self) -> &str {
        &self.spec.node_id
    }

    fn index_version(&self) -> Option<&str> {
        Some(&self.spec.version)
    }

    fn index_published(&self) -> bool {
        self.is_published()
    }

    fn spec_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.spec)
    }

    fn take_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}
