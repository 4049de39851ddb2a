//! Decoding of opaque resource values by serialization format.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;

use crate::api::SerializationFormat;
use crate::envoy::{
    Cluster, ClusterLoadAssignment, Listener, ResourceType, RouteConfiguration, Runtime,
    XdsResource,
};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} resources are not declared inline")]
    NotInline(ResourceType),
}

/// Decodes `value` into `T` using `format`.
pub fn decode<T: DeserializeOwned>(
    format: SerializationFormat,
    value: &str,
) -> Result<T, DecodeError> {
    match format {
        SerializationFormat::Json => Ok(serde_json::from_str(value)?),
        SerializationFormat::B64json => {
            let bytes = BASE64.decode(value.trim())?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        SerializationFormat::Yaml => Ok(serde_yaml::from_str(value)?),
    }
}

/// Decodes `value` into the typed resource matching `resource_type`.
pub fn decode_resource(
    resource_type: ResourceType,
    format: SerializationFormat,
    value: &str,
) -> Result<XdsResource, DecodeError> {
    let resource = match resource_type {
        ResourceType::Endpoint => decode::<ClusterLoadAssignment>(format, value)?.into(),
        ResourceType::Cluster => decode::<Cluster>(format, value)?.into(),
        ResourceType::Route => decode::<RouteConfiguration>(format, value)?.into(),
        ResourceType::Listener => decode::<Listener>(format, value)?.into(),
        ResourceType::Runtime => decode::<Runtime>(format, value)?.into(),
        ResourceType::Secret => return Err(DecodeError::NotInline(resource_type)),
    };
    Ok(resource)
}
