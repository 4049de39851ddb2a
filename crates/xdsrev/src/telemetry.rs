//! Process-wide logging setup.
//!
//! Library code logs through the `log` facade and opens `tracing` spans
//! around reconciles. [`init_logging`] routes both into one
//! `tracing-subscriber` registry.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::config::{LogFormat, LoggingSettings};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber. `RUST_LOG` overrides the configured
/// level. Returns `false` if logging was already initialized, by this
/// function or by someone else.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match settings.format {
        LogFormat::Text => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    };
    if installed.is_err() {
        return false;
    }

    // Bridge `log` records into tracing
    tracing_log::LogTracer::init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_noop() {
        let settings = LoggingSettings::default();
        // The first call may lose to another test's subscriber; the second never succeeds
        let _ = init_logging(&settings);
        assert!(!init_logging(&settings));
        log::info!("logging initialized");
    }
}
