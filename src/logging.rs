use crate::config::Settings;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Initialise the global subscriber.
/// `RUST_LOG` overrides `logging.level`; `logging.json` switches the formatter.
pub fn init(settings: &Settings) {
    let level = settings
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a second bootstrap (tests) must not panic
    let res = if settings.logging.json.unwrap_or(false) {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if res.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}
