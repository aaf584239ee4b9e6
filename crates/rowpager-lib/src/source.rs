//! Source detection: a remote dataset API vs local data files.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataSource {
    /// Base URL of a dataset API.
    Remote(String),
    /// Local files served in-process.
    Local(Vec<PathBuf>),
}

/// True for `http://` and `https://` URLs, by string parsing only.
pub fn is_http_url(s: &str) -> bool {
    s.find("://").is_some_and(|i| {
        let scheme = s[..i].to_lowercase();
        scheme == "http" || scheme == "https"
    })
}

/// Classifies the command-line sources. With none given, falls back to the
/// configured base URL. A URL cannot be mixed with files, and only one API
/// can be browsed at a time.
pub fn resolve_sources(sources: &[String], base_url: Option<&str>) -> Result<DataSource> {
    if sources.is_empty() {
        return base_url
            .map(|url| DataSource::Remote(url.to_string()))
            .ok_or_else(|| eyre!("No source given and source.base_url is not configured"));
    }

    let urls: Vec<&String> = sources.iter().filter(|s| is_http_url(s)).collect();
    match urls.as_slice() {
        [] => {
            if let Some(other) = sources.iter().find(|s| s.contains("://")) {
                return Err(eyre!("Unsupported URL scheme: {}", other));
            }
            Ok(DataSource::Local(sources.iter().map(PathBuf::from).collect()))
        }
        [url] if sources.len() == 1 => Ok(DataSource::Remote(url.to_string())),
        [_] => Err(eyre!("A dataset API URL cannot be combined with local files")),
        _ => Err(eyre!("Only one dataset API URL can be browsed at a time")),
    }
}
