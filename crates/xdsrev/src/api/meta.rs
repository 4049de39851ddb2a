//! K8s-style object envelope shared by every stored record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The API version for all xdsrev records.
pub const API_VERSION: &str = "xdsrev.io/v1";

/// Label carrying the node id of a revision.
pub const LABEL_NODE_ID: &str = "xdsrev.io/node-id";

/// Label carrying the content version of a revision.
pub const LABEL_VERSION: &str = "xdsrev.io/version";

/// Finalizer that keeps a DesiredConfig around until its node's snapshot is cleared.
pub const SNAPSHOT_FINALIZER: &str = "xdsrev.io/snapshot-cleanup";

/// The kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    DesiredConfig,
    Revision,
    ControllerSettings,
}

impl ResourceKind {
    /// Returns the kinds that are persisted in the record store.
    pub fn stored() -> &'static [ResourceKind] {
        &[ResourceKind::DesiredConfig, ResourceKind::Revision]
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::DesiredConfig => write!(f, "DesiredConfig"),
            ResourceKind::Revision => write!(f, "Revision"),
            ResourceKind::ControllerSettings => write!(f, "ControllerSettings"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desiredconfig" => Ok(ResourceKind::DesiredConfig),
            "revision" => Ok(ResourceKind::Revision),
            "controllersettings" => Ok(ResourceKind::ControllerSettings),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// Namespaced name identifying a record of a given kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Points from an owned record back at its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: ResourceKind,
    pub name: String,
    pub uid: String,
    /// Whether the owner manages the lifecycle of this record.
    #[serde(default)]
    pub controller: bool,
}

/// Metadata for a record, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The unique name of the record within its namespace and kind.
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Assigned by the store on creation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Bumped by the store whenever the spec changes.
    #[serde(default)]
    pub generation: i64,

    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,

    /// Key-value labels for organizing and selecting records.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Key-value annotations for storing additional metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set when deletion was requested while finalizers were pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with a namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Adds a label to the metadata.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer if missing. Returns true if the metadata changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes the finalizer if present. Returns true if the metadata changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns the owner reference flagged as controller, if any.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.controller)
    }
}

/// A generic K8s-style record wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(
        serialize = "S: Serialize, T: Serialize",
        deserialize = "S: Deserialize<'de>, T: Deserialize<'de> + Default"
    )
)]
pub struct Resource<S, T> {
    /// API version, should always be `xdsrev.io/v1`.
    pub api_version: String,

    /// The kind of record.
    pub kind: ResourceKind,

    /// Record metadata.
    pub metadata: ObjectMeta,

    /// The desired state, written by the record's owner.
    pub spec: S,

    /// The observed state, written only by the reconciler.
    #[serde(default)]
    pub status: T,
}

impl<S, T: Default> Resource<S, T> {
    /// Creates a new record with the given kind and spec and an empty status.
    pub fn new(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: S,
    ) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: T::default(),
        }
    }
}

impl<S, T> Resource<S, T> {
    /// Returns the name of the record.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Builds an owner reference pointing at this record.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: self.kind,
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            controller: true,
        }
    }
}
