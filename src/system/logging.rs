//! Logging system initialization
//!
//! This module sets up tracing based on the `[logging]` section of
//! the static configuration.

use crate::config::LoggingConfig;
use tracing_appender::rolling;

/// Initialize logging system based on configuration
///
/// Sets up file output, daily rotation and the text/JSON formatter.
///
/// **Note**: Call once during startup, after the configuration has been loaded.
///
/// # Returns
/// * `WorkerGuard` - Must be kept alive for the duration of the program
///   to ensure non-blocking log writes are flushed
pub fn init_logging(config: &LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let writer = build_writer(config);

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_target(true)
        .with_ansi(config.file.as_ref().is_none_or(|f| f.is_empty()));

    let result = if config.format == "json" {
        subscriber_builder.json().try_init()
    } else {
        subscriber_builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("[WARN] Logging already initialized: {}", e);
    }

    guard
}

fn build_writer(config: &LoggingConfig) -> Box<dyn std::io::Write + Send + Sync> {
    let Some(log_file) = config.file.as_ref().filter(|f| !f.is_empty()) else {
        return Box::new(std::io::stdout());
    };

    let path = std::path::Path::new(log_file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("[WARN] Failed to create log directory {}: {}", dir.display(), e);
    }

    if config.enable_rotation {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("remediation-engine.log");
        match rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(filename.trim_end_matches(".log"))
            .filename_suffix("log")
            .max_log_files(config.max_backups.max(1) as usize)
            .build(dir)
        {
            Ok(appender) => Box::new(appender),
            Err(e) => {
                eprintln!("[WARN] Failed to create rolling log appender: {}", e);
                Box::new(std::io::stdout())
            }
        }
    } else {
        // 不轮转，追加写入
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
        {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("[WARN] Failed to open log file {}: {}", log_file, e);
                Box::new(std::io::stdout())
            }
        }
    }
}
