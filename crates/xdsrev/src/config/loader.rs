use std::path::{Path, PathBuf};

use crate::api::{ResourceKind, API_VERSION};
use crate::config::schema::ControllerSettings;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/controller-settings-v1.json");

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "XDSREV_CONFIG";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<ControllerSettings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings = load_settings_from_str(&content)?;
    log::info!("Loaded controller settings from {}", path.display());
    Ok(settings)
}

pub fn load_settings_from_str(content: &str) -> Result<ControllerSettings, ConfigError> {
    let value: serde_json::Value = serde_yaml::from_str(content)?;

    validate_schema(&value)?;

    let settings: ControllerSettings = serde_json::from_value(value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Loads settings from the first of: `explicit`, the file named by
/// `XDSREV_CONFIG`, or the default location if it exists. Falls back to
/// built-in defaults when none applies.
pub fn load_settings_or_default(explicit: Option<&Path>) -> Result<ControllerSettings, ConfigError> {
    match resolve_settings_path(explicit) {
        Some(path) => load_settings(path),
        None => {
            log::debug!("No settings file found, using defaults");
            Ok(ControllerSettings::default())
        }
    }
}

fn resolve_settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|p| p.exists())
}

/// Returns the canonical settings path: `<config dir>/xdsrev/controller.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("xdsrev").join("controller.yaml"))
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express. Also applied to settings
/// built in code.
pub fn validate_settings(settings: &ControllerSettings) -> Result<(), ConfigError> {
    if settings.api_version != API_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported apiVersion: {}", settings.api_version),
        });
    }
    if settings.kind != ResourceKind::ControllerSettings {
        return Err(ConfigError::Validation {
            message: format!("Expected kind ControllerSettings, got {}", settings.kind),
        });
    }

    let spec = &settings.spec;
    if !(1..=100).contains(&spec.max_revisions) {
        return Err(ConfigError::Validation {
            message: format!("maxRevisions must be in 1..=100, got {}", spec.max_revisions),
        });
    }
    if spec.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "workerCount must be at least 1".to_string(),
        });
    }
    if spec.requeue.base_delay_ms > spec.requeue.max_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "requeue.baseDelayMs ({}) exceeds requeue.maxDelayMs ({})",
                spec.requeue.base_delay_ms, spec.requeue.max_delay_ms
            ),
        });
    }
    if tracing_subscriber::EnvFilter::try_new(&spec.logging.level).is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level filter: {}", spec.logging.level),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;
    use serial_test::serial;

    #[test]
    fn test_load_minimal_settings() {
        let yaml = r#"
apiVersion: xdsrev.io/v1
kind: ControllerSettings
"#;
        let settings = load_settings_from_str(yaml).unwrap();
        assert_eq!(settings.metadata.name, "default");
        assert_eq!(settings.spec.max_revisions, 10);
        assert!(!settings.spec.taint_on_rejection);
    }

    #[test]
    fn test_load_full_settings() {
        let yaml = r#"
apiVersion: xdsrev.io/v1
kind: ControllerSettings
metadata:
  name: edge
spec:
  maxRevisions: 5
  workerCount: 2
  databasePath: /var/lib/xdsrev/xdsrev.db
  requeue:
    baseDelayMs: 100
    maxDelayMs: 2000
  resyncIntervalSecs: 0
  taintOnRejection: true
  logging:
    level: xdsrev=debug,info
    format: json
"#;
        let settings = load_settings_from_str(yaml).unwrap();
        assert_eq!(settings.metadata.name, "edge");
        assert_eq!(settings.spec.max_revisions, 5);
        assert_eq!(settings.spec.worker_count, 2);
        assert_eq!(settings.spec.requeue.max_delay_ms, 2000);
        assert!(settings.spec.resync_interval().is_none());
        assert!(settings.spec.taint_on_rejection);
        assert_eq!(settings.spec.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_schema_rejects_out_of_range_history() {
        let yaml = r#"
apiVersion: xdsrev.io/v1
kind: ControllerSettings
spec:
  maxRevisions: 0
"#;
        let err = load_settings_from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let yaml = r#"
apiVersion: xdsrev.io/v1
kind: ControllerSettings
spec:
  maxRevision: 5
"#;
        assert!(matches!(
            load_settings_from_str(yaml),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_schema_rejects_wrong_api_version() {
        let yaml = r#"
apiVersion: xdsrev.io/v2
kind: ControllerSettings
"#;
        assert!(matches!(
            load_settings_from_str(yaml),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_inverted_backoff_is_rejected() {
        let yaml = r#"
apiVersion: xdsrev.io/v1
kind: ControllerSettings
spec:
  requeue:
    baseDelayMs: 5000
    maxDelayMs: 100
"#;
        assert!(matches!(
            load_settings_from_str(yaml),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            load_settings_from_str("apiVersion: [unclosed"),
            Err(ConfigError::ParseYaml(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_var_selects_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.yaml");
        std::fs::write(
            &path,
            "apiVersion: xdsrev.io/v1\nkind: ControllerSettings\nspec:\n  maxRevisions: 3\n",
        )
        .unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let settings = load_settings_or_default(None);
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(settings.unwrap().spec.max_revisions, 3);
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.yaml");
        std::fs::write(
            &explicit,
            "apiVersion: xdsrev.io/v1\nkind: ControllerSettings\nspec:\n  maxRevisions: 7\n",
        )
        .unwrap();

        std::env::set_var(CONFIG_ENV, dir.path().join("missing.yaml"));
        let settings = load_settings_or_default(Some(&explicit));
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(settings.unwrap().spec.max_revisions, 7);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_settings("/nonexistent/xdsrev/controller.yaml").unwrap_err();
        match err {
            ConfigError::ReadFile { path, .. } => {
                assert!(path.ends_with("controller.yaml"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("xdsrev/controller.yaml"));
        }
    }
}
