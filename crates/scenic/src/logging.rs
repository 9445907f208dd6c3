//! Structured logging initialisation.
//!
//! Scenario and step events are emitted through `tracing`; this module
//! installs a formatting subscriber writing to stderr so test output on stdout
//! stays readable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::EngineConfig;

fn filter_from_config(config: &EngineConfig) -> EnvFilter {
    EnvFilter::new(config.log_level.as_filter_str())
}

/// Initialise the logging subsystem based on configuration.
///
/// Log level precedence (highest to lowest):
///
/// 1. An explicit override applied to `config`
/// 2. `SCENIC_LOG_LEVEL`
/// 3. The default level (`info`)
///
/// If a global subscriber is already set, the call is ignored, so every test
/// may call it.
pub fn init_logging(config: &EngineConfig) {
    let filter = filter_from_config(config);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    // First subscriber wins.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
