//! Per-node snapshots of typed proxy resources.
//!
//! A snapshot holds one bucket per [`ResourceType`], each with its own
//! version label. Snapshots are rebuilt from a revision on every reconcile
//! and never persisted.

pub mod cache;
pub mod differ;

use std::collections::BTreeMap;

use crate::envoy::{ResourceType, XdsResource};

pub use cache::{InMemorySnapshotCache, SnapshotCache, SnapshotEvent};
pub use differ::snapshots_equal;

/// The resources of one type plus their version label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resources {
    pub version: String,
    pub items: BTreeMap<String, XdsResource>,
}

/// Compare snapshots with [`snapshots_equal`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    node_id: String,
    buckets: [Resources; 6],
}

impl Snapshot {
    /// Creates an empty snapshot with every bucket tagged `version`.
    pub fn new(node_id: impl Into<String>, version: &str) -> Self {
        let bucket = || Resources {
            version: version.to_string(),
            items: BTreeMap::new(),
        };
        Self {
            node_id: node_id.into(),
            buckets: [bucket(), bucket(), bucket(), bucket(), bucket(), bucket()],
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Inserts `resource` under `name` in the bucket matching its type.
    /// Resources of a type this engine does not serve are dropped.
    pub fn set_resource(&mut self, name: impl Into<String>, resource: impl Into<XdsResource>) {
        let resource = resource.into();
        let name = name.into();
        match resource.resource_type() {
            Some(resource_type) => {
                self.buckets[resource_type.index()]
                    .items
                    .insert(name, resource);
            }
            None => {
                log::debug!(
                    "Dropping resource '{}' of unserved type for node {}",
                    name,
                    self.node_id
                );
            }
        }
    }

    pub fn resources(&self, resource_type: ResourceType) -> &Resources {
        &self.buckets[resource_type.index()]
    }

    pub fn version(&self, resource_type: ResourceType) -> &str {
        &self.buckets[resource_type.index()].version
    }

    pub fn set_version(&mut self, resource_type: ResourceType, version: impl Into<String>) {
        self.buckets[resource_type.index()].version = version.into();
    }

    /// Version label of every bucket.
    pub fn versions(&self) -> BTreeMap<ResourceType, String> {
        ResourceType::all()
            .iter()
            .map(|t| (*t, self.version(*t).to_string()))
            .collect()
    }

    /// Total number of resources across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
