//! User-facing error message formatting.
//!
//! Matches on typed errors (LoadError, PolarsError variants, io::ErrorKind)
//! rather than parsing strings.

use crate::error::LoadError;
use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

/// Short status-line text for a failed page or listing request.
pub fn user_message_from_load_error(err: &LoadError) -> String {
    match err {
        LoadError::Transport(msg) => format!("Failed to fetch data: {}. Press r to retry.", msg),
        LoadError::MalformedResponse(msg) => {
            format!("The server sent an unexpected response ({}). Press r to retry.", msg)
        }
        LoadError::NotFound(id) => format!("Dataset not found: {}", id),
        LoadError::UpstreamData(msg) => format!("The data source failed: {}", msg),
        LoadError::InvalidRequest(msg) => format!("Invalid request: {}", msg),
    }
}

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            msg
        ),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::ComputeError(msg) => msg.to_string(),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::ConnectionRefused => "Connection refused.".to_string(),
        ErrorKind::TimedOut => "Timed out.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find LoadError, PolarsError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    let with_path = |msg: String| match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    };
    for cause in report.chain() {
        if let Some(le) = cause.downcast_ref::<LoadError>() {
            return with_path(user_message_from_load_error(le));
        }
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None));
        }
    }

    // First line only, to avoid long tracebacks
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_path(first_line.trim().to_string())
}
