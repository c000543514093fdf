use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "etl.log";

/// ETL progress at info, everything else (sqlx, rusqlite) only from warn.
const DEFAULT_FILTER: &str = "house_prices=info,warn";

/// Console output for the operator plus `logs/etl.log.<date>` as JSON lines.
pub fn init_logging() {
    // A run without a writable logs/ still logs to the console
    let _ = fs::create_dir_all(LOG_DIR);

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (etl_log, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(etl_log))
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .init();

    // The etl.log writer thread stops when the guard drops, so it never does
    std::mem::forget(guard);
}
