use basketry_core::config::{LogFormat, LoggingConfig};
use tracing::Level;

/// Installs the global subscriber on stderr so stdout carries only command output. A
/// second call in the same process keeps the first subscriber.
pub fn init(config: &LoggingConfig) {
    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "system.logging.already_installed", "logging already initialized");
    }
}
