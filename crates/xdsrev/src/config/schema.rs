use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{ResourceKind, API_VERSION};
use crate::secrets::expand_home;

/// Root settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    pub api_version: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub metadata: SettingsMetadata,
    #[serde(default)]
    pub spec: ControllerSpec,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: ResourceKind::ControllerSettings,
            metadata: SettingsMetadata::default(),
            spec: ControllerSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsMetadata {
    #[serde(default = "default_settings_name")]
    pub name: String,
}

fn default_settings_name() -> String {
    "default".to_string()
}

impl Default for SettingsMetadata {
    fn default() -> Self {
        Self {
            name: default_settings_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    /// Length bound of every config's revision history.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,
    /// Number of reconciles that may run at once.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub requeue: RequeueSettings,
    /// Seconds between full resyncs. Zero disables periodic resync.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
    /// Whether a proxy rejecting its configuration taints the published revision.
    #[serde(default)]
    pub taint_on_rejection: bool,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub const DEFAULT_MAX_REVISIONS: usize = 10;

fn default_max_revisions() -> usize {
    DEFAULT_MAX_REVISIONS
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_database_path() -> String {
    "~/.xdsrev/data/xdsrev.db".to_string()
}

fn default_resync_interval() -> u64 {
    300
}

impl Default for ControllerSpec {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            worker_count: default_worker_count(),
            database_path: default_database_path(),
            requeue: RequeueSettings::default(),
            resync_interval_secs: default_resync_interval(),
            taint_on_rejection: false,
            logging: LoggingSettings::default(),
        }
    }
}

impl ControllerSpec {
    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.database_path))
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Backoff applied to reconciles that failed with a retryable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequeueSettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RequeueSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RequeueSettings {
    /// Delay before retry number `attempt` (1-based): the base delay doubled
    /// per attempt, capped at the max delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
