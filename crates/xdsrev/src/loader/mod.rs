//! Materializes a declared resource bundle into a typed snapshot.
//!
//! Every declared value is decoded with the bundle's serialization format.
//! Secret entries are resolved through the [`SecretStore`] and must be TLS
//! secrets. Any failure aborts the whole load; a partial snapshot is never
//! returned.

pub mod format;

use std::sync::Arc;

use crate::api::{EnvoyResource, EnvoyResources, ObjectKey, SerializationFormat};
use crate::envoy::{ResourceType, Secret};
use crate::hash::hash_chunks;
use crate::secrets::{SecretError, SecretKind, SecretStore, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};
use crate::snapshot::Snapshot;

pub use format::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to decode {resource_type} resource at index {index} ({value:?}): {source}")]
    Deserialize {
        resource_type: ResourceType,
        index: usize,
        value: String,
        #[source]
        source: DecodeError,
    },

    #[error("secret {key} not found")]
    SecretNotFound { key: ObjectKey },

    #[error("secret {key} is of kind {kind}, expected tls")]
    InvalidSecretKind { key: ObjectKey, kind: SecretKind },

    #[error("secret {key} has no {entry} entry")]
    MissingSecretKey { key: ObjectKey, entry: &'static str },

    #[error("failed to fetch secret {key}: {source}")]
    SecretStore {
        key: ObjectKey,
        #[source]
        source: SecretError,
    },
}

impl LoadError {
    /// Validation errors permanently disqualify the content being loaded;
    /// everything else may succeed on a later attempt.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LoadError::Deserialize { .. }
                | LoadError::InvalidSecretKind { .. }
                | LoadError::MissingSecretKey { .. }
        )
    }

    /// Short machine-readable reason for condition messages.
    pub fn reason(&self) -> &'static str {
        match self {
            LoadError::Deserialize { .. } => "DeserializationFailed",
            LoadError::SecretNotFound { .. } => "SecretNotFound",
            LoadError::InvalidSecretKind { .. } => "InvalidSecretKind",
            LoadError::MissingSecretKey { .. } => "MissingSecretKey",
            LoadError::SecretStore { .. } => "SecretStoreUnavailable",
        }
    }
}

/// Builds snapshots from declared bundles.
pub struct ResourceLoader {
    secrets: Arc<dyn SecretStore>,
}

impl ResourceLoader {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }

    /// Loads `resources` into a snapshot for `node_id` with every bucket
    /// tagged `version`.
    ///
    /// Unqualified secret references resolve in `namespace`. When the bundle
    /// has secrets, the secret bucket's version becomes
    /// `{version}-{hash of the resolved secret material}` so that rotating a
    /// secret changes the version without a change to the bundle.
    pub async fn load(
        &self,
        node_id: &str,
        namespace: &str,
        version: &str,
        format: SerializationFormat,
        resources: &EnvoyResources,
    ) -> Result<Snapshot, LoadError> {
        let mut snapshot = Snapshot::new(node_id, version);

        for (resource_type, entries) in [
            (ResourceType::Endpoint, &resources.endpoints),
            (ResourceType::Cluster, &resources.clusters),
            (ResourceType::Route, &resources.routes),
            (ResourceType::Listener, &resources.listeners),
            (ResourceType::Runtime, &resources.runtimes),
        ] {
            load_entries(&mut snapshot, resource_type, format, entries)?;
        }

        if !resources.secrets.is_empty() {
            let mut resolved = Vec::with_capacity(resources.secrets.len());
            for entry in &resources.secrets {
                let key = ObjectKey::new(
                    entry.secret_ref.namespace_or(namespace),
                    entry.secret_ref.name.clone(),
                );
                let (cert, private_key) = self.fetch_tls(&key).await?;
                resolved.push((entry.name.clone(), cert, private_key));
            }
            resolved.sort_by(|a, b| a.0.cmp(&b.0));

            let secret_hash = hash_chunks(resolved.iter().flat_map(|(name, cert, key)| {
                [name.as_bytes(), cert.as_slice(), key.as_slice()]
            }));
            for (name, cert, private_key) in resolved {
                let secret = Secret::tls(name.clone(), &cert, &private_key);
                snapshot.set_resource(name, secret);
            }
            snapshot.set_version(ResourceType::Secret, format!("{}-{}", version, secret_hash));
        }

        log::debug!(
            "Loaded {} resources for node {} at version {}",
            snapshot.len(),
            node_id,
            version
        );
        Ok(snapshot)
    }

    async fn fetch_tls(&self, key: &ObjectKey) -> Result<(Vec<u8>, Vec<u8>), LoadError> {
        let secret = self
            .secrets
            .get_secret(key)
            .await
            .map_err(|source| LoadError::SecretStore {
                key: key.clone(),
                source,
            })?
            .ok_or_else(|| LoadError::SecretNotFound { key: key.clone() })?;

        if secret.kind != SecretKind::Tls {
            return Err(LoadError::InvalidSecretKind {
                key: key.clone(),
                kind: secret.kind,
            });
        }

        let entry = |name: &'static str| {
            secret
                .get(name)
                .map(|v| v.to_vec())
                .ok_or_else(|| LoadError::MissingSecretKey {
                    key: key.clone(),
                    entry: name,
                })
        };
        Ok((entry(TLS_CERT_KEY)?, entry(TLS_PRIVATE_KEY_KEY)?))
    }
}

fn load_entries(
    snapshot: &mut Snapshot,
    resource_type: ResourceType,
    format: SerializationFormat,
    entries: &[EnvoyResource],
) -> Result<(), LoadError> {
    for (index, entry) in entries.iter().enumerate() {
        let resource = format::decode_resource(resource_type, format, &entry.value).map_err(
            |source| LoadError::Deserialize {
                resource_type,
                index,
                value: entry.value.clone(),
                source,
            },
        )?;
        snapshot.set_resource(entry.name.clone(), resource);
    }
    Ok(())
}
