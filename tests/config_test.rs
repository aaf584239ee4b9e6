use rowpager_lib::config::{AppConfig, ConfigManager};
use rowpager_lib::{Args, OpenOptions};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

// Helper to create a temporary config directory for testing
fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

fn write_config(manager: &ConfigManager, content: &str) {
    manager
        .ensure_config_dir()
        .expect("Failed to create config dir");
    fs::write(manager.config_path("config.toml"), content).expect("Failed to write config");
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.version, "0.1");
    assert_eq!(config.source.base_url, None);
    assert_eq!(config.source.page_size, 1000);
    assert_eq!(config.source.request_timeout_secs, 30);
    assert_eq!(config.cache.ttl_secs, 300);
    assert_eq!(config.loader.threshold, 0.8);
    assert_eq!(config.loader.cooldown_ms, 100);
    assert_eq!(config.display.overscan, 5);
    assert!(!config.display.row_numbers);
    assert_eq!(config.display.row_start_index, 1);
    assert_eq!(config.performance.event_poll_interval_ms, 25);
    assert_eq!(config.logging.level, "info");
    assert!(!config.debug.enabled);
}

#[test]
fn test_write_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let config_path = config_manager
        .write_default_config(false)
        .expect("Failed to write config");
    assert!(config_path.exists());

    let content = fs::read_to_string(&config_path).expect("Failed to read config");
    assert!(content.contains("# [cache]"));
    assert!(content.contains("# ttl_secs = 300"));

    // Everything is commented out, so loading it yields the defaults.
    let loaded = AppConfig::load_from(&config_manager).expect("template should load");
    assert_eq!(loaded, AppConfig::default());
}

#[test]
fn test_write_config_without_force_fails_if_exists() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    config_manager
        .write_default_config(false)
        .expect("First write should succeed");

    let result = config_manager.write_default_config(false);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("already exists"));
}

#[test]
fn test_write_config_with_force_overwrites() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_config(&config_manager, "[cache]\nttl_secs = 10\n");

    let path = config_manager
        .write_default_config(true)
        .expect("Write with force should succeed");

    let content = fs::read_to_string(path).unwrap();
    assert!(!content.contains("ttl_secs = 10"));
}

#[test]
fn test_load_with_no_file_returns_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let config = AppConfig::load_from(&config_manager).expect("Should load default config");
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_load_partial_config_keeps_other_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_config(
        &config_manager,
        r#"
[source]
base_url = "http://localhost:3000/api"
page_size = 250

[loader]
cooldown_ms = 0
"#,
    );

    let config = AppConfig::load_from(&config_manager).expect("Failed to load config");
    assert_eq!(
        config.source.base_url.as_deref(),
        Some("http://localhost:3000/api")
    );
    assert_eq!(config.source.page_size, 250);
    assert_eq!(config.loader.cooldown(), Duration::ZERO);
    assert_eq!(config.loader.threshold, 0.8);
    assert_eq!(config.cache.ttl(), Duration::from_secs(300));
}

#[test]
fn test_invalid_config_is_rejected_with_path() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_config(&config_manager, "[loader]\nthreshold = 0.0\n");

    let err = AppConfig::load_from(&config_manager).unwrap_err().to_string();
    assert!(err.contains("Invalid configuration"), "got: {}", err);
    assert!(err.contains("config.toml"));
}

#[test]
fn test_unparsable_config_is_rejected() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_config(&config_manager, "[cache\nttl_secs = ");

    let err = AppConfig::load_from(&config_manager).unwrap_err().to_string();
    assert!(err.contains("Failed to parse config file"), "got: {}", err);
}

#[test]
fn test_cli_args_override_loaded_config() {
    use clap::Parser;

    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_config(
        &config_manager,
        "[display]\noverscan = 2\nrow_numbers = true\n\n[cache]\nttl_secs = 60\n",
    );
    let config = AppConfig::load_from(&config_manager).unwrap();

    let args = Args::parse_from(["rowpager", "data.csv", "--overscan", "9"]);
    let opts = OpenOptions::from_args_and_config(&args, &config);

    assert_eq!(opts.overscan, 9);
    assert!(opts.row_numbers);
    assert_eq!(opts.cache_ttl, Duration::from_secs(60));
    assert_eq!(opts.page_size, 1000);
}
