//! Builder patterns for test records.

#![allow(dead_code)]

use xdsrev::api::{
    DesiredConfig, DesiredConfigSpec, EnvoyResource, EnvoyResources, EnvoySecretResource,
    SecretReference, SerializationFormat,
};

pub const NAMESPACE: &str = "default";

/// Builder for a DesiredConfig and its resource bundle.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    name: String,
    namespace: String,
    node_id: String,
    serialization: SerializationFormat,
    resources: EnvoyResources,
}

impl ConfigBuilder {
    pub fn new(name: &str, node_id: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: NAMESPACE.to_string(),
            node_id: node_id.to_string(),
            serialization: SerializationFormat::Json,
            resources: EnvoyResources::default(),
        }
    }

    pub fn serialization(mut self, format: SerializationFormat) -> Self {
        self.serialization = format;
        self
    }

    /// An endpoint assignment for `cluster`.
    pub fn endpoint(mut self, name: &str, cluster: &str) -> Self {
        self.resources.endpoints.push(EnvoyResource::new(
            name,
            format!(r#"{{"cluster_name":"{}"}}"#, cluster),
        ));
        self
    }

    pub fn cluster(mut self, name: &str) -> Self {
        self.resources.clusters.push(EnvoyResource::new(
            name,
            format!(r#"{{"name":"{}","connect_timeout":"1s"}}"#, name),
        ));
        self
    }

    /// A cluster with production fields that have no typed counterpart.
    pub fn tuned_cluster(mut self, name: &str, max_connections: u32) -> Self {
        self.resources.clusters.push(EnvoyResource::new(
            name,
            format!(
                r#"{{"name":"{}","connectTimeout":"1s","circuit_breakers":{{"thresholds":[{{"max_connections":{}}}]}},"outlier_detection":{{"consecutive_5xx":5}}}}"#,
                name, max_connections
            ),
        ));
        self
    }

    /// An endpoint whose value does not deserialize.
    pub fn malformed_endpoint(mut self, name: &str) -> Self {
        self.resources
            .endpoints
            .push(EnvoyResource::new(name, r#"{"cluster_name": "#));
        self
    }

    pub fn secret(mut self, name: &str, secret_name: &str) -> Self {
        self.resources
            .secrets
            .push(EnvoySecretResource::new(name, secret_name));
        self
    }

    pub fn secret_in(mut self, name: &str, namespace: &str, secret_name: &str) -> Self {
        self.resources.secrets.push(EnvoySecretResource {
            name: name.to_string(),
            secret_ref: SecretReference {
                name: secret_name.to_string(),
                namespace: Some(namespace.to_string()),
            },
        });
        self
    }

    pub fn resources(&self) -> &EnvoyResources {
        &self.resources
    }

    pub fn build(self) -> DesiredConfig {
        DesiredConfig::desired(
            self.namespace,
            self.name,
            DesiredConfigSpec {
                node_id: self.node_id,
                serialization: self.serialization,
                resources: self.resources,
            },
        )
    }
}
