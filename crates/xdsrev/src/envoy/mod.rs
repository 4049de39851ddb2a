//! Typed proxy resources and the closed set of resource types a node is served.

pub mod common;
pub mod resources;

use serde::{Deserialize, Serialize};

pub use common::{Address, DataSource, SocketAddress, TypedExtensionConfig};
pub use resources::{
    Cluster, ClusterLoadAssignment, Listener, RouteConfiguration, Runtime, Secret, TlsCertificate,
};

/// The resource types carried by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Endpoint,
    Cluster,
    Route,
    Listener,
    Secret,
    Runtime,
}

impl ResourceType {
    /// Returns all resource types.
    pub fn all() -> &'static [ResourceType] {
        &[
            ResourceType::Endpoint,
            ResourceType::Cluster,
            ResourceType::Route,
            ResourceType::Listener,
            ResourceType::Secret,
            ResourceType::Runtime,
        ]
    }

    /// The discovery-protocol type URL of this resource type.
    pub fn type_url(&self) -> &'static str {
        match self {
            ResourceType::Endpoint => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            ResourceType::Cluster => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            ResourceType::Route => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
            ResourceType::Listener => "type.googleapis.com/envoy.config.listener.v3.Listener",
            ResourceType::Secret => {
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret"
            }
            ResourceType::Runtime => "type.googleapis.com/envoy.service.runtime.v3.Runtime",
        }
    }

    /// Position of this type in [`ResourceType::all`].
    pub fn index(&self) -> usize {
        match self {
            ResourceType::Endpoint => 0,
            ResourceType::Cluster => 1,
            ResourceType::Route => 2,
            ResourceType::Listener => 3,
            ResourceType::Secret => 4,
            ResourceType::Runtime => 5,
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<ResourceType> {
        Self::all().iter().copied().find(|t| t.type_url() == type_url)
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Endpoint => write!(f, "endpoint"),
            ResourceType::Cluster => write!(f, "cluster"),
            ResourceType::Route => write!(f, "route"),
            ResourceType::Listener => write!(f, "listener"),
            ResourceType::Secret => write!(f, "secret"),
            ResourceType::Runtime => write!(f, "runtime"),
        }
    }
}

/// A typed resource ready to be placed into a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum XdsResource {
    Endpoint(ClusterLoadAssignment),
    Cluster(Cluster),
    Route(RouteConfiguration),
    Listener(Listener),
    Secret(Secret),
    Runtime(Runtime),
    /// A resource whose type this engine does not serve.
    Unknown { type_url: String },
}

impl XdsResource {
    /// Returns the bucket this resource belongs to, `None` for unknown types.
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            XdsResource::Endpoint(_) => Some(ResourceType::Endpoint),
            XdsResource::Cluster(_) => Some(ResourceType::Cluster),
            XdsResource::Route(_) => Some(ResourceType::Route),
            XdsResource::Listener(_) => Some(ResourceType::Listener),
            XdsResource::Secret(_) => Some(ResourceType::Secret),
            XdsResource::Runtime(_) => Some(ResourceType::Runtime),
            XdsResource::Unknown { .. } => None,
        }
    }
}

impl From<ClusterLoadAssignment> for XdsResource {
    fn from(value: ClusterLoadAssignment) -> Self {
        XdsResource::Endpoint(value)
    }
}

impl From<Cluster> for XdsResource {
    fn from(value: Cluster) -> Self {
        XdsResource::Cluster(value)
    }
}

impl From<RouteConfiguration> for XdsResource {
    fn from(value: RouteConfiguration) -> Self {
        XdsResource::Route(value)
    }
}

impl From<Listener> for XdsResource {
    fn from(value: Listener) -> Self {
        XdsResource::Listener(value)
    }
}

impl From<Secret> for XdsResource {
    fn from(value: Secret) -> Self {
        XdsResource::Secret(value)
    }
}

impl From<Runtime> for XdsResource {
    fn from(value: Runtime) -> Self {
        XdsResource::Runtime(value)
    }
}
