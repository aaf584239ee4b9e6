//! Log file setup. The terminal belongs to the TUI, so events go to a file.

use crate::config::LoggingConfig;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "rowpager.log";

/// Filter directive in order of precedence: RUST_LOG, the command line, the config file.
pub fn filter_directive(rust_log: Option<&str>, cli_level: Option<&str>, config_level: &str) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or(cli_level)
        .unwrap_or(config_level)
        .to_string()
}

/// Configured path, or `rowpager.log` under the user cache directory.
pub fn log_file_path(config: &LoggingConfig, app_name: &str) -> Result<PathBuf> {
    if let Some(file) = &config.file {
        return Ok(PathBuf::from(file));
    }
    let dir = dirs::cache_dir()
        .ok_or_else(|| eyre!("Could not determine cache directory for the log file"))?
        .join(app_name);
    Ok(dir.join(LOG_FILE_NAME))
}

/// Installs the global subscriber. Returns the log file path.
pub fn init(config: &LoggingConfig, cli_level: Option<&str>, app_name: &str) -> Result<PathBuf> {
    let path = log_file_path(config, app_name)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| eyre!("Failed to open log file {}: {}", path.display(), e))?;

    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), cli_level, &config.level);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| eyre!("Invalid log filter {:?}: {}", directive, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    tracing::info!(log_file = %path.display(), filter = %directive, "logging initialized");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive(Some("trace"), Some("debug"), "info"), "trace");
        assert_eq!(filter_directive(None, Some("debug"), "info"), "debug");
        assert_eq!(filter_directive(Some("  "), None, "warn"), "warn");
    }

    #[test]
    fn test_log_file_path_override() {
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some("/tmp/custom.log".to_string()),
        };
        assert_eq!(
            log_file_path(&config, "rowpager").unwrap(),
            PathBuf::from("/tmp/custom.log")
        );
    }
}
