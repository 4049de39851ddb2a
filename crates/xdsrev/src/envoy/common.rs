//! Building blocks shared by several resource kinds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocketAddress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "portValue")]
    pub port_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<SocketProtocol>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub path: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "socketAddress")]
    pub socket_address: Option<SocketAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<Pipe>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Address {
    pub fn socket(address: impl Into<String>, port: u32) -> Self {
        Self {
            socket_address: Some(SocketAddress {
                address: address.into(),
                port_value: Some(port),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// A named extension with an opaque `Any`-style configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedExtensionConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "typedConfig")]
    pub typed_config: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Where a blob of bytes comes from. Exactly one field is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Base64 encoded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "inlineBytes")]
    pub inline_bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "inlineString")]
    pub inline_string: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DataSource {
    pub fn inline_bytes(bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self {
            inline_bytes: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ..Default::default()
        }
    }
}
