use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XdsrevError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Resource load error: {0}")]
    Load(#[from] crate::loader::LoadError),

    #[error("Secret store error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] crate::controller::ReconcileError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

pub type Result<T> = std::result::Result<T, XdsrevError>;
