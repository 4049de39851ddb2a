pub mod api;
pub mod config;
pub mod controller;
pub mod envoy;
pub mod error;
pub mod hash;
pub mod loader;
pub mod secrets;
pub mod snapshot;
pub mod store;
pub mod telemetry;

pub use api::{
    CacheState, DesiredConfig, DesiredConfigSpec, DesiredConfigStatus, EnvoyResource,
    EnvoyResources, EnvoySecretResource, ObjectKey, Revision, SerializationFormat,
};
pub use config::{load_settings, load_settings_or_default, ControllerSettings, ControllerSpec};
pub use controller::{Context, Controller, ReconcileError, WorkItem};
pub use error::{ConfigError, Result, XdsrevError};
pub use hash::hash_resources;
pub use loader::{LoadError, ResourceLoader};
pub use secrets::{DirectorySecretStore, InMemorySecretStore, SecretData, SecretError, SecretStore};
pub use snapshot::{snapshots_equal, InMemorySnapshotCache, Snapshot, SnapshotCache};
pub use store::{RecordStore, SqliteStore, StoreError, StoreEvent};
pub use telemetry::init_logging;
