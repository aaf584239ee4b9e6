//! Shared CLI definitions for rowpager.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::Path;

/// File format for local data files (used to bypass extension-based detection).
/// When `--format` is not specified, format is auto-detected from the file extension.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Parquet columnar format
    Parquet,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// JSON Lines / NDJSON (one JSON object per line)
    Jsonl,
    /// Arrow IPC / Feather
    Arrow,
}

impl FileFormat {
    /// Detect file format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "arrow" | "ipc" | "feather" => Some(Self::Arrow),
            _ => None,
        }
    }
}

/// Command-line arguments for rowpager
#[derive(Clone, Parser, Debug)]
#[command(
    name = "rowpager",
    version,
    about = "Browse very large datasets in the terminal, one page at a time",
    long_about = "Browse very large datasets in the terminal, one page at a time.\n\n\
        SOURCE is either the base URL of a dataset API (http:// or https://), which must serve \
        /datasets and /datasets/{id}?page=&limit=, or one or more local data files \
        (csv, tsv, parquet, arrow, jsonl) that are served in-process through the same pagination contract."
)]
pub struct Args {
    /// Base URL of the dataset API, or path(s) to local data files.
    /// When omitted, source.base_url from the config file is used
    #[arg(num_args = 0.., value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Dataset id to select on startup (default: first dataset by name)
    #[arg(long = "dataset", value_name = "ID")]
    pub dataset: Option<String>,

    /// Rows requested per page (default: 1000)
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<u32>,

    /// Seconds a fetched page stays servable from the in-memory cache (default: 300)
    #[arg(long = "cache-ttl-secs", value_name = "SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Fraction of loaded content that must be scrolled past before the next page is requested (default: 0.8)
    #[arg(long = "load-threshold", value_name = "FRACTION")]
    pub load_threshold: Option<f64>,

    /// Milliseconds the loader stays latched after a page settles (default: 100)
    #[arg(long = "cooldown-ms", value_name = "MS")]
    pub cooldown_ms: Option<u64>,

    /// Extra rows rendered above and below the viewport (default: 5)
    #[arg(long = "overscan", value_name = "N")]
    pub overscan: Option<usize>,

    /// HTTP request timeout in seconds (default: 30)
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Force local file format (parquet, csv, tsv, jsonl, arrow).
    /// By default format is auto-detected from the file extension.
    #[arg(long = "format", value_enum)]
    pub format: Option<FileFormat>,

    /// Display row numbers on the left side of the table
    #[arg(long = "row-numbers", action)]
    pub row_numbers: bool,

    /// Starting index for row numbers (default: 1)
    #[arg(long = "row-start-index")]
    pub row_start_index: Option<usize>,

    /// Enable debug mode to show loader and cache counters
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Log level for the log file (error, warn, info, debug, trace). RUST_LOG takes precedence
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Generate default configuration file at ~/.config/rowpager/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn value_placeholder(arg: &clap::Arg) -> String {
    arg.get_value_names()
        .map(|names| {
            names
                .iter()
                .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary; output is written to stdout.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    let usage = cmd.render_usage();
    out.push_str(&usage.to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Options\n\n");
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }

        let option_str = if arg.is_positional() {
            let placeholder = value_placeholder(arg);
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            let placeholder = if arg.get_action().takes_values() {
                value_placeholder(arg)
            } else {
                String::new()
            };
            if placeholder.is_empty() {
                op
            } else {
                format!("{op} {placeholder}")
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }

    out
}
