//! The Revision record: one immutable snapshot of a node's declared bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conditions::{
    is_condition_true, Condition, RESOURCES_OUT_OF_SYNC, REVISION_PUBLISHED, REVISION_TAINTED,
};
use super::desired_config::{DesiredConfig, EnvoyResources, SerializationFormat};
use super::meta::{Resource, ResourceKind, LABEL_NODE_ID, LABEL_VERSION};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    pub version: String,
    #[serde(default)]
    pub serialization: SerializationFormat,
    #[serde(default)]
    pub resources: EnvoyResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub tainted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

pub type Revision = Resource<RevisionSpec, RevisionStatus>;

impl Revision {
    /// Builds the revision for `version` of the given config, labelled for
    /// lookup by node and version and owned by the config.
    pub fn for_config(config: &DesiredConfig, version: &str) -> Self {
        let spec = RevisionSpec {
            node_id: config.spec.node_id.clone(),
            version: version.to_string(),
            serialization: config.spec.serialization,
            resources: config.spec.resources.clone(),
        };
        let mut revision: Revision = Resource::new(
            ResourceKind::Revision,
            config.namespace(),
            revision_name(config.name(), version),
            spec,
        );
        revision
            .metadata
            .labels
            .insert(LABEL_NODE_ID.to_string(), config.spec.node_id.clone());
        revision
            .metadata
            .labels
            .insert(LABEL_VERSION.to_string(), version.to_string());
        revision
            .metadata
            .owner_references
            .push(config.owner_reference());
        revision
    }

    pub fn node_id(&self) -> &str {
        &self.spec.node_id
    }

    pub fn version(&self) -> &str {
        &self.spec.version
    }

    pub fn is_published(&self) -> bool {
        is_condition_true(&self.status.conditions, REVISION_PUBLISHED)
    }

    pub fn is_tainted(&self) -> bool {
        is_condition_true(&self.status.conditions, REVISION_TAINTED)
    }

    pub fn resources_out_of_sync(&self) -> bool {
        is_condition_true(&self.status.conditions, RESOURCES_OUT_OF_SYNC)
    }
}

/// Record name of the revision holding `version` of config `config_name`.
pub fn revision_name(config_name: &str, version: &str) -> String {
    format!("{}-{}", config_name, version)
}
