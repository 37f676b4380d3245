use std::process::ExitCode;

use leadflow_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_env("LEADFLOW_LOG_FILTER")
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    // Invalid configuration is reported by the command itself, so log with defaults.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config);

    leadflow_cli::run()
}
