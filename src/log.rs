use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing. With a file path, log JSON to the file (via a
/// non-blocking appender) and human-readable output to the console;
/// without one, console only. Returns the appender guard that must
/// stay alive for the process lifetime.
pub fn init(
    log_file: Option<&str>,
    log_level: &str,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_timer(SystemTime)
            .with_target(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return Ok(None);
    };

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_timer(SystemTime)
        .with_target(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(SystemTime)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(Some(guard))
}
