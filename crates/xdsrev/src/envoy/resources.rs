//! The six proxy resource kinds served to a node.
//!
//! Field names follow the proxy's JSON/YAML representation and also accept
//! the lowerCamelCase spelling of the proto JSON mapping. Only the fields the
//! engine inspects are typed; every other field lands in `extra` unchanged,
//! so it is served as declared and takes part in snapshot comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{Address, DataSource, TypedExtensionConfig};

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterLoadAssignment {
    #[serde(alias = "clusterName")]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<LocalityLbEndpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalityLbEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "lbEndpoints")]
    pub lb_endpoints: Vec<LbEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "loadBalancingWeight")]
    pub load_balancing_weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "subZone")]
    pub sub_zone: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LbEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "healthStatus")]
    pub health_status: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "loadBalancingWeight")]
    pub load_balancing_weight: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
    Draining,
    Timeout,
    Degraded,
}

// ============================================================================
// Clusters
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub discovery_type: Option<DiscoveryType>,
    /// Duration in the proxy's string form, e.g. `"0.25s"`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "connectTimeout")]
    pub connect_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "lbPolicy")]
    pub lb_policy: Option<LbPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "loadAssignment")]
    pub load_assignment: Option<ClusterLoadAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "edsClusterConfig")]
    pub eds_cluster_config: Option<EdsClusterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "dnsLookupFamily")]
    pub dns_lookup_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "http2ProtocolOptions")]
    pub http2_protocol_options: Option<serde_json::Value>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        alias = "typedExtensionProtocolOptions",
    )]
    pub typed_extension_protocol_options: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "healthChecks")]
    pub health_checks: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "transportSocket")]
    pub transport_socket: Option<TypedExtensionConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    Static,
    StrictDns,
    LogicalDns,
    Eds,
    OriginalDst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    RoundRobin,
    LeastRequest,
    RingHash,
    Random,
    Maglev,
    ClusterProvided,
    LoadBalancingPolicyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdsClusterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "edsConfig")]
    pub eds_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "serviceName")]
    pub service_name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "virtualHosts")]
    pub virtual_hosts: Vec<VirtualHost>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "validateClusters")]
    pub validate_clusters: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "match")]
    pub route_match: RouteMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "directResponse")]
    pub direct_response: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "safeRegex")]
    pub safe_regex: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "weightedClusters")]
    pub weighted_clusters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "prefixRewrite")]
    pub prefix_rewrite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Listeners
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "filterChains")]
    pub filter_chains: Vec<FilterChain>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "listenerFilters")]
    pub listener_filters: Vec<TypedExtensionConfig>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "perConnectionBufferLimitBytes",
    )]
    pub per_connection_buffer_limit_bytes: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "filterChainMatch")]
    pub filter_chain_match: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<TypedExtensionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "transportSocket")]
    pub transport_socket: Option<TypedExtensionConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Runtime
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Secrets
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "tlsCertificate")]
    pub tls_certificate: Option<TlsCertificate>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "validationContext")]
    pub validation_context: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCertificate {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "certificateChain")]
    pub certificate_chain: Option<DataSource>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "privateKey")]
    pub private_key: Option<DataSource>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Secret {
    /// A TLS certificate secret with inline PEM material.
    pub fn tls(name: impl Into<String>, certificate_chain: &[u8], private_key: &[u8]) -> Self {
        Self {
            name: name.into(),
            tls_certificate: Some(TlsCertificate {
                certificate_chain: Some(DataSource::inline_bytes(certificate_chain)),
                private_key: Some(DataSource::inline_bytes(private_key)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_cluster_yaml() {
        let yaml = r#"
name: backend
type: STRICT_DNS
connect_timeout: 0.25s
lb_policy: ROUND_ROBIN
load_assignment:
  cluster_name: backend
  endpoints:
    - lb_endpoints:
        - endpoint:
            address:
              socket_address: { address: backend.local, port_value: 8080 }
"#;
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cluster.name, "backend");
        assert_eq!(cluster.discovery_type, Some(DiscoveryType::StrictDns));
        assert_eq!(cluster.lb_policy, Some(LbPolicy::RoundRobin));
        let cla = cluster.load_assignment.unwrap();
        let socket = cla.endpoints[0].lb_endpoints[0]
            .endpoint
            .as_ref()
            .and_then(|e| e.address.as_ref())
            .and_then(|a| a.socket_address.as_ref())
            .unwrap();
        assert_eq!(socket.port_value, Some(8080));
    }

    #[test]
    fn test_untyped_fields_are_kept() {
        let json = r#"{
            "name": "backend",
            "connect_timeout": "1s",
            "circuit_breakers": {"thresholds": [{"max_connections": 100}]},
            "outlier_detection": {"consecutive_5xx": 5}
        }"#;
        let cluster: Cluster = serde_json::from_str(json).unwrap();
        assert_eq!(cluster.connect_timeout.as_deref(), Some("1s"));
        assert_eq!(
            cluster.extra["circuit_breakers"]["thresholds"][0]["max_connections"],
            100
        );
        assert!(cluster.extra.contains_key("outlier_detection"));

        let back = serde_json::to_value(&cluster).unwrap();
        assert_eq!(back["outlier_detection"]["consecutive_5xx"], 5);
    }

    #[test]
    fn test_camel_case_names_are_accepted() {
        let json = r#"{
            "clusterName": "e1",
            "endpoints": [{"lbEndpoints": [{"endpoint": {"address":
                {"socketAddress": {"address": "10.0.0.1", "portValue": 80}}}}]}]
        }"#;
        let cla: ClusterLoadAssignment = serde_json::from_str(json).unwrap();
        assert_eq!(cla.cluster_name, "e1");
        let socket = cla.endpoints[0].lb_endpoints[0]
            .endpoint
            .as_ref()
            .and_then(|e| e.address.as_ref())
            .and_then(|a| a.socket_address.as_ref())
            .unwrap();
        assert_eq!(socket.port_value, Some(80));
        assert!(cla.extra.is_empty());
    }

    #[test]
    fn test_route_match_keyword() {
        let json = r#"{
            "name": "local",
            "virtual_hosts": [{
                "name": "any",
                "domains": ["*"],
                "routes": [{"match": {"prefix": "/"}, "route": {"cluster": "backend"}}]
            }]
        }"#;
        let route: RouteConfiguration = serde_json::from_str(json).unwrap();
        let r = &route.virtual_hosts[0].routes[0];
        assert_eq!(r.route_match.prefix.as_deref(), Some("/"));
        assert_eq!(
            r.route.as_ref().and_then(|a| a.cluster.as_deref()),
            Some("backend")
        );
    }

    #[test]
    fn test_tls_secret_is_base64_inline() {
        let secret = Secret::tls("cert", b"CERT", b"KEY");
        let tls = secret.tls_certificate.unwrap();
        assert_eq!(
            tls.certificate_chain.unwrap().inline_bytes.as_deref(),
            Some("Q0VSVA==")
        );
        assert_eq!(tls.private_key.unwrap().inline_bytes.as_deref(), Some("S0VZ"));
    }
}
