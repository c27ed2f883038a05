use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,vendorspend=debug,vendorspend_lib=debug";

/// Initialize tracing with stderr, optional JSON file, and Sentry layers.
///
/// - Stderr: compact, human-readable; stdout is reserved for command output
/// - JSON file: daily-rotated under `json_dir` when configured
/// - Sentry: captures ERROR events as issues, WARN as breadcrumbs
/// - Filter: `RUST_LOG`, else `config.level`, else info
///
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.level.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let (file_layer, guard) = match &config.json_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vendorspend.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_current_span(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // No-op when Sentry DSN is not configured.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(sentry_layer)
        .init();

    tracing::debug!("Tracing initialized");
    guard
}
