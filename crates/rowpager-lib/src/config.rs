use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate default configuration template as a string with comments.
    /// All fields are commented out so defaults are used, but users can uncomment to override
    pub fn generate_default_config(&self) -> String {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config)
            .unwrap_or_else(|e| panic!("Failed to serialize default config: {}", e));

        let comments = Self::collect_all_comments();
        Self::comment_all_fields(toml_str, comments)
    }

    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();

        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }

        let sections: &[(&str, &[(&str, &str)])] = &[
            ("source", SOURCE_COMMENTS),
            ("cache", CACHE_COMMENTS),
            ("loader", LOADER_COMMENTS),
            ("display", DISPLAY_COMMENTS),
            ("performance", PERFORMANCE_COMMENTS),
            ("logging", LOGGING_COMMENTS),
            ("debug", DEBUG_COMMENTS),
        ];
        for (section, fields) in sections {
            for (field, comment) in *fields {
                comments.insert(format!("{}.{}", section, field), comment.to_string());
            }
        }

        comments
    }

    /// Comment out all fields in TOML and add comments.
    /// Also adds missing Option fields as commented-out `# field = null`
    fn comment_all_fields(toml: String, comments: HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# rowpager configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                current_section = section.clone();
                if let Some(header) = SECTION_HEADERS.iter().find(|(s, _)| s == &section) {
                    result.push_str(header.1);
                    result.push('\n');
                }
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }
                seen_fields.insert(field_path);
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, &comments, &seen_fields)
    }

    /// Option fields are not serialized when None; list them anyway so users can find them.
    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        let option_fields = ["source.base_url", "logging.file"];

        for field_path in option_fields {
            if seen_fields.contains(field_path) || !comments.contains_key(field_path) {
                continue;
            }
            let Some((section, field_name)) = field_path.split_once('.') else {
                continue;
            };
            let section_header = format!("[{}]", section);
            let Some(section_pos) = result.find(&section_header) else {
                continue;
            };
            let after_header_start = section_pos + section_header.len();
            let newline_pos = result[after_header_start..].find('\n').unwrap_or(0);
            let insert_pos = after_header_start + newline_pos + 1;

            let mut new_content = String::new();
            if let Some(comment) = comments.get(field_path) {
                for comment_line in comment.lines() {
                    new_content.push_str("# ");
                    new_content.push_str(comment_line);
                    new_content.push('\n');
                }
            }
            new_content.push_str(&format!("# {} = null\n\n", field_name));
            result.insert_str(insert_pos, &new_content);
        }

        result
    }

    /// Section name from a TOML line like "[loader]"
    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }
        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, self.generate_default_config())?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub loader: LoaderConfig,
    pub display: DisplayConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
    pub debug: DebugConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "source",
        "# ============================================================================\n# Data Source\n# ============================================================================",
    ),
    (
        "cache",
        "# ============================================================================\n# Page Cache\n# ============================================================================",
    ),
    (
        "loader",
        "# ============================================================================\n# Incremental Loading\n# ============================================================================",
    ),
    (
        "display",
        "# ============================================================================\n# Display Settings\n# ============================================================================",
    ),
    (
        "performance",
        "# ============================================================================\n# Performance Settings\n# ============================================================================",
    ),
    (
        "logging",
        "# ============================================================================\n# Logging\n# ============================================================================",
    ),
    (
        "debug",
        "# ============================================================================\n# Debug Settings\n# ============================================================================",
    ),
];

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Dataset API used when no source is given on the command line.
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub page_size: u32,
}

const SOURCE_COMMENTS: &[(&str, &str)] = &[
    (
        "base_url",
        "Base URL of the dataset API used when no SOURCE is given on the command line\nExample: base_url = \"http://localhost:3000/api\"",
    ),
    ("request_timeout_secs", "HTTP request timeout in seconds"),
    (
        "page_size",
        "Rows requested per page\nLarger pages mean fewer requests but slower first paint",
    ),
];

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
            page_size: crate::loader::DEFAULT_PAGE_SIZE,
        }
    }
}

impl SourceConfig {
    pub fn merge(&mut self, other: Self) {
        let default = SourceConfig::default();
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.request_timeout_secs != default.request_timeout_secs {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.page_size != default.page_size {
            self.page_size = other.page_size;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

const CACHE_COMMENTS: &[(&str, &str)] = &[(
    "ttl_secs",
    "Seconds a fetched page is served from memory before it is requested again",
)];

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn merge(&mut self, other: Self) {
        if other.ttl_secs != CacheConfig::default().ttl_secs {
            self.ttl_secs = other.ttl_secs;
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub threshold: f64,
    pub cooldown_ms: u64,
}

const LOADER_COMMENTS: &[(&str, &str)] = &[
    (
        "threshold",
        "Fraction of the loaded rows that must be scrolled past before the next page is requested (0 < threshold <= 1)",
    ),
    (
        "cooldown_ms",
        "Milliseconds the loader waits after a page arrives before it may request another",
    ),
];

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            threshold: crate::loader::DEFAULT_THRESHOLD,
            cooldown_ms: 100,
        }
    }
}

impl LoaderConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LoaderConfig::default();
        if other.threshold != default.threshold {
            self.threshold = other.threshold;
        }
        if other.cooldown_ms != default.cooldown_ms {
            self.cooldown_ms = other.cooldown_ms;
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Rows rendered above and below the viewport.
    pub overscan: usize,
    pub row_numbers: bool,
    pub row_start_index: usize,
    pub table_cell_padding: usize,
    /// Text drawn in rows that are still loading.
    pub placeholder: String,
}

const DISPLAY_COMMENTS: &[(&str, &str)] = &[
    (
        "overscan",
        "Extra rows rendered above and below the visible area\nAvoids blank rows when scrolling fast",
    ),
    ("row_numbers", "Display row numbers on the left side of the table"),
    ("row_start_index", "Starting index for row numbers (0 or 1)"),
    (
        "table_cell_padding",
        "Number of spaces between columns in the main data table (>= 0)\nDefault 2",
    ),
    ("placeholder", "Text shown in rows that are still loading"),
];

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            overscan: 5,
            row_numbers: false,
            row_start_index: 1,
            table_cell_padding: 2,
            placeholder: "Loading more...".to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DisplayConfig::default();
        if other.overscan != default.overscan {
            self.overscan = other.overscan;
        }
        if other.row_numbers != default.row_numbers {
            self.row_numbers = other.row_numbers;
        }
        if other.row_start_index != default.row_start_index {
            self.row_start_index = other.row_start_index;
        }
        if other.table_cell_padding != default.table_cell_padding {
            self.table_cell_padding = other.table_cell_padding;
        }
        if other.placeholder != default.placeholder {
            self.placeholder = other.placeholder;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub event_poll_interval_ms: u64,
}

const PERFORMANCE_COMMENTS: &[(&str, &str)] = &[(
    "event_poll_interval_ms",
    "Event polling interval in milliseconds\nLower values = more responsive but higher CPU usage",
)];

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            event_poll_interval_ms: 25,
        }
    }
}

impl PerformanceConfig {
    pub fn merge(&mut self, other: Self) {
        if other.event_poll_interval_ms != PerformanceConfig::default().event_poll_interval_ms {
            self.event_poll_interval_ms = other.event_poll_interval_ms;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "rowpager_lib::cache=debug".
    pub level: String,
    /// Log file path. None = rowpager.log in the user cache directory.
    pub file: Option<String>,
}

const LOGGING_COMMENTS: &[(&str, &str)] = &[
    (
        "level",
        "Log filter (error, warn, info, debug, trace, or a tracing directive like \"rowpager_lib::cache=debug\")\nThe RUST_LOG environment variable takes precedence",
    ),
    (
        "file",
        "Log file path. null = rowpager.log in the user cache directory",
    ),
];

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.level != LoggingConfig::default().level {
            self.level = other.level;
        }
        if other.file.is_some() {
            self.file = other.file;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

const DEBUG_COMMENTS: &[(&str, &str)] = &[(
    "enabled",
    "Show loader state and cache counters in a debug row by default",
)];

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        if other.enabled != DebugConfig::default().enabled {
            self.enabled = other.enabled;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            source: SourceConfig::default(),
            cache: CacheConfig::default(),
            loader: LoaderConfig::default(),
            display: DisplayConfig::default(),
            performance: PerformanceConfig::default(),
            logging: LoggingConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        Self::load_from(&ConfigManager::new(app_name)?)
    }

    /// Load defaults merged with the `config.toml` managed by `manager`, if any.
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let config_path = manager.config_path("config.toml");
        let mut config = AppConfig::default();
        config.merge(Self::load_user_config(&config_path)?);

        config.validate().map_err(|e| {
            eyre!(
                "Invalid configuration in {}: {}",
                config_path.display(),
                e
            )
        })?;

        Ok(config)
    }

    fn load_user_config(config_path: &Path) -> Result<AppConfig> {
        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.source.merge(other.source);
        self.cache.merge(other.cache);
        self.loader.merge(other.loader);
        self.display.merge(other.display);
        self.performance.merge(other.performance);
        self.logging.merge(other.logging);
        self.debug.merge(other.debug);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if self.source.page_size == 0 {
            return Err(eyre!("source.page_size must be greater than 0"));
        }

        if self.source.request_timeout_secs == 0 {
            return Err(eyre!("source.request_timeout_secs must be greater than 0"));
        }

        if let Some(url) = &self.source.base_url {
            if !crate::source::is_http_url(url) {
                return Err(eyre!(
                    "source.base_url must start with http:// or https://, got {}",
                    url
                ));
            }
        }

        if !(self.loader.threshold > 0.0 && self.loader.threshold <= 1.0) {
            return Err(eyre!(
                "loader.threshold must be in (0, 1], got {}",
                self.loader.threshold
            ));
        }

        if self.performance.event_poll_interval_ms == 0 {
            return Err(eyre!("event_poll_interval_ms must be greater than 0"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(eyre!("logging.level must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.page_size, 1000);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.loader.cooldown(), Duration::from_millis(100));
        assert_eq!(config.display.overscan, 5);
    }

    #[test]
    fn test_merge_only_overrides_changed_fields() {
        let mut base = AppConfig::default();
        base.display.overscan = 8;
        let mut other = AppConfig::default();
        other.loader.threshold = 0.5;
        base.merge(other);
        assert_eq!(base.display.overscan, 8);
        assert_eq!(base.loader.threshold, 0.5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.loader.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.base_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_defaults_match_loader_defaults() {
        let config = AppConfig::default();
        let loader = crate::loader::LoaderSettings::default();
        assert_eq!(config.source.page_size, loader.page_size);
        assert_eq!(config.loader.threshold, loader.threshold);
        assert_eq!(config.loader.cooldown(), loader.cooldown);
    }

    #[test]
    fn test_template_parses_back_to_defaults() {
        let manager = ConfigManager::with_dir(PathBuf::from("/nonexistent"));
        let template = manager.generate_default_config();
        assert!(template.contains("# base_url = null"));
        assert!(template.contains("# file = null"));
        assert!(template.contains("# [loader]"));
        let parsed: AppConfig = toml::from_str(&template).unwrap();
        assert_eq!(parsed.source.page_size, crate::loader::DEFAULT_PAGE_SIZE);
    }
}
