//! Logging system configuration and initialization
//!
//! Console and/or file output through `tracing-subscriber`, with an optional
//! JSON file layer. `RUST_LOG` overrides the configured filter. Dependency
//! targets (sqlx, reqwest, hyper) are turned down unless the level is trace.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

// Keeps the non-blocking file writers alive for the life of the process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

const QUIET_DIRECTIVES: &[&str] = &[
    "sqlx::query=warn",
    "sqlx::sqlite=warn",
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "rustls=warn",
    "html5ever=warn",
    "selectors=warn",
];

/// Directory log files are written to
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        ConfigManager::get_app_data_dir()
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default())
            .join("logs")
    })
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in QUIET_DIRECTIVES {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    for (module, level) in &config.module_filters {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| anyhow!("Invalid module filter '{}': {}", directive, e))?,
        );
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config)?;
    let log_dir = get_log_directory(&config);

    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        let file_appender = rolling::never(&log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        Some(file_writer)
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(ChronoLocal::rfc_3339())
            .with_target(false)
    });
    let json_file_layer = file_writer.clone().filter(|_| config.json_format).map(|writer| {
        fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_timer(ChronoLocal::rfc_3339())
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
    });
    let plain_file_layer = file_writer.filter(|_| !config.json_format).map(|writer| {
        fmt::Layer::new()
            .with_writer(writer)
            .with_timer(ChronoLocal::rfc_3339())
            .with_target(false)
            .with_ansi(false)
    });

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(json_file_layer)
        .with(plain_file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {:?}", log_dir.join(&config.file_name));
    }
    Ok(())
}

/// Log build and host information for diagnostics
pub fn log_system_info() {
    info!("=== Coin Catalog ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
        assert!(!config.json_format);
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(config).is_err());
    }

    #[test]
    fn test_module_filters_are_validated() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("coin_catalog_lib".to_string(), "debug".to_string());
        if std::env::var("RUST_LOG").is_err() {
            let filter = build_env_filter(&config).unwrap();
            assert!(filter.to_string().contains("coin_catalog_lib=debug"));
        }
    }

    #[test]
    fn test_explicit_log_dir_wins() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/coin-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config), PathBuf::from("/tmp/coin-logs"));
    }
}
