pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, load_settings, load_settings_from_str, load_settings_or_default,
    validate_settings, CONFIG_ENV,
};
pub use schema::{
    ControllerSettings, ControllerSpec, LogFormat, LoggingSettings, RequeueSettings,
    SettingsMetadata, DEFAULT_MAX_REVISIONS,
};
