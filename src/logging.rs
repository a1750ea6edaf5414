use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of the engine and store events
const LEDGER_TARGET: &str = "simple_ledger::ledger";

/// Filter used when `RUST_LOG` is unset.
///
/// sqlx logs every statement at info, so it is held at warn unless the
/// ledger itself is traced.
fn default_directives(config: &AppConfig) -> String {
    let ledger_level = config
        .ledger_log_level
        .as_deref()
        .unwrap_or(config.log_level.as_str());
    let sqlx_level = if ledger_level.eq_ignore_ascii_case("trace") {
        "info"
    } else {
        "warn"
    };
    format!(
        "{},{}={},sqlx={}",
        config.log_level, LEDGER_TARGET, ledger_level, sqlx_level
    )
}

/// Install the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "never" => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
    };
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    if config.use_json {
        let stdout_layer = fmt::layer().with_target(true).compact();
        let file_layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(file_writer)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    } else {
        let stdout_layer = fmt::layer().with_target(true).compact();
        let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    }

    tracing::info!(
        log_dir = %config.log_dir,
        rotation = %config.rotation,
        json = config.use_json,
        "Logging initialized"
    );
    guard
}
