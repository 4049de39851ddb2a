//! The DesiredConfig record: one per managed node.

use serde::{Deserialize, Serialize};

use super::conditions::{is_condition_true, Condition, ROLLBACK_FAILED};
use super::meta::{Resource, ResourceKind};

/// Encoding of every opaque resource value in a bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    #[default]
    Json,
    B64json,
    Yaml,
}

impl std::fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationFormat::Json => write!(f, "json"),
            SerializationFormat::B64json => write!(f, "b64json"),
            SerializationFormat::Yaml => write!(f, "yaml"),
        }
    }
}

impl std::str::FromStr for SerializationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "b64json" => Ok(SerializationFormat::B64json),
            "yaml" => Ok(SerializationFormat::Yaml),
            _ => Err(format!("Unknown serialization format: {}", s)),
        }
    }
}

/// A named, still-serialized proxy resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvoyResource {
    pub name: String,
    pub value: String,
}

impl EnvoyResource {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reference to secret material held in the external secret store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
    /// Defaults to the namespace of the referencing record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretReference {
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvoySecretResource {
    pub name: String,
    #[serde(rename = "ref")]
    pub secret_ref: SecretReference,
}

impl EnvoySecretResource {
    pub fn new(name: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret_ref: SecretReference {
                name: secret_name.into(),
                namespace: None,
            },
        }
    }
}

/// The declared resource bundle for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvoyResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EnvoyResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<EnvoyResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<EnvoyResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<EnvoyResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtimes: Vec<EnvoyResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<EnvoySecretResource>,
}

impl EnvoyResources {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
            && self.clusters.is_empty()
            && self.routes.is_empty()
            && self.listeners.is_empty()
            && self.runtimes.is_empty()
            && self.secrets.is_empty()
    }

    /// Whether any secret entry points at `namespace/name`, resolving
    /// unqualified references against `default_namespace`.
    pub fn references_secret(&self, default_namespace: &str, namespace: &str, name: &str) -> bool {
        self.secrets.iter().any(|s| {
            s.secret_ref.name == name && s.secret_ref.namespace_or(default_namespace) == namespace
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfigSpec {
    /// Stable identifier of the remote proxy this config is served to.
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default)]
    pub serialization: SerializationFormat,
    #[serde(default)]
    pub resources: EnvoyResources,
}

/// How the published version relates to the desired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    InSync,
    Rollback,
    RollbackFailed,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheState::InSync => write!(f, "InSync"),
            CacheState::Rollback => write!(f, "Rollback"),
            CacheState::RollbackFailed => write!(f, "RollbackFailed"),
        }
    }
}

/// One entry of the revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRef {
    pub version: String,
    /// Name of the Revision record, in the DesiredConfig's namespace.
    pub revision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfigStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_state: Option<CacheState>,
    /// Oldest first, most recent at the tail.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<RevisionRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DesiredConfigStatus {
    pub fn history_position(&self, version: &str) -> Option<usize> {
        self.revisions.iter().position(|r| r.version == version)
    }

    pub fn history_versions(&self) -> Vec<&str> {
        self.revisions.iter().map(|r| r.version.as_str()).collect()
    }
}

pub type DesiredConfig = Resource<DesiredConfigSpec, DesiredConfigStatus>;

impl DesiredConfig {
    pub fn desired(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: DesiredConfigSpec,
    ) -> Self {
        Resource::new(ResourceKind::DesiredConfig, namespace, name, spec)
    }

    pub fn node_id(&self) -> &str {
        &self.spec.node_id
    }

    pub fn rollback_failed(&self) -> bool {
        is_condition_true(&self.status.conditions, ROLLBACK_FAILED)
    }
}
