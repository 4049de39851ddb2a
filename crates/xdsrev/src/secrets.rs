//! External secret material referenced by declared bundles.
//!
//! Two backends are provided:
//!
//! 1. **In-memory** - For tests and embedding (e.g. a watcher on another store feeds it)
//! 2. **Directory** - For mounted secrets (e.g. `<root>/<namespace>/<name>/tls.crt`)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::api::ObjectKey;

/// Key holding the PEM certificate chain of a TLS secret.
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Key holding the PEM private key of a TLS secret.
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Error type for secret backend failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for secret lookups.
pub type Result<T> = std::result::Result<T, SecretError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    /// Holds `tls.crt` and `tls.key`.
    Tls,
    Opaque,
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretKind::Tls => write!(f, "tls"),
            SecretKind::Opaque => write!(f, "opaque"),
        }
    }
}

/// Raw key material of one secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretData {
    pub kind: SecretKind,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretData {
    pub fn tls(certificate_chain: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        let mut data = BTreeMap::new();
        data.insert(TLS_CERT_KEY.to_string(), certificate_chain.into());
        data.insert(TLS_PRIVATE_KEY_KEY.to_string(), private_key.into());
        Self {
            kind: SecretKind::Tls,
            data,
        }
    }

    pub fn opaque(data: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            kind: SecretKind::Opaque,
            data,
        }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(|v| v.as_slice())
    }
}

impl std::fmt::Debug for SecretData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretData")
            .field("kind", &self.kind)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fetch-by-reference access to secret material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns `None` when no secret exists under `key`.
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretData>>;
}

// ============================================
// In-memory backend
// ============================================

/// Secret store held in memory. Every write is broadcast as a change of the
/// written key so published revisions can be resynced.
pub struct InMemorySecretStore {
    secrets: DashMap<ObjectKey, SecretData>,
    events: broadcast::Sender<ObjectKey>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            secrets: DashMap::new(),
            events,
        }
    }

    /// Inserts or replaces a secret.
    pub fn put(&self, key: ObjectKey, data: SecretData) {
        let changed = self
            .secrets
            .insert(key.clone(), data.clone())
            .map(|old| old != data)
            .unwrap_or(true);
        if changed {
            let _ = self.events.send(key);
        }
    }

    pub fn remove(&self, key: &ObjectKey) {
        if self.secrets.remove(key).is_some() {
            let _ = self.events.send(key.clone());
        }
    }

    /// Returns a receiver of changed secret keys.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectKey> {
        self.events.subscribe()
    }
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretData>> {
        Ok(self.secrets.get(key).map(|s| s.value().clone()))
    }
}

// ============================================
// Directory backend
// ============================================

/// Reads secrets laid out as `<root>/<namespace>/<name>/<key>` files.
///
/// A secret directory containing both `tls.crt` and `tls.key` is a TLS
/// secret; anything else is opaque.
pub struct DirectorySecretStore {
    root: PathBuf,
}

impl DirectorySecretStore {
    /// `root` may start with `~`, which is expanded to the home directory.
    pub fn new(root: impl AsRef<str>) -> Self {
        Self {
            root: PathBuf::from(expand_home(root.as_ref())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir(&self, dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
        let entries = fs::read_dir(dir).map_err(|e| SecretError::FileReadError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut data = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| SecretError::FileReadError {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Mounted secret volumes keep bookkeeping files under dot-names
            if name.starts_with('.') {
                continue;
            }
            let content = fs::read(&path).map_err(|e| SecretError::FileReadError {
                path: path.clone(),
                source: e,
            })?;
            data.insert(name.to_string(), content);
        }
        Ok(data)
    }
}

#[async_trait]
impl SecretStore for DirectorySecretStore {
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<SecretData>> {
        let dir = self.root.join(&key.namespace).join(&key.name);
        if !dir.is_dir() {
            return Ok(None);
        }

        let data = self.read_dir(&dir)?;
        let kind = if data.contains_key(TLS_CERT_KEY) && data.contains_key(TLS_PRIVATE_KEY_KEY) {
            SecretKind::Tls
        } else {
            SecretKind::Opaque
        };
        Ok(Some(SecretData { kind, data }))
    }
}

/// Expands `~` to the user's home directory.
///
/// Works cross-platform: checks HOME (Unix) then USERPROFILE (Windows).
/// Handles both `~/path` and standalone `~`. `~user/path` is not supported.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
