use thiserror::Error;

/// Failure of one page or listing request.
///
/// Every variant carries a message string so the error is `Clone`: a request
/// that several callers joined hands the same error to each of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Non-2xx status or network failure.
    #[error("Failed to fetch data: {0}")]
    Transport(String),

    /// The payload is not a `success: true` envelope of the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unknown dataset id.
    #[error("Dataset not found: {0}")]
    NotFound(String),

    /// The dataset exists but nothing can serve its backing table.
    #[error("Upstream data error: {0}")]
    UpstreamData(String),

    /// Page < 1, zero page size, or an unparsable parameter.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LoadError {
    /// Stable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Transport(_) => "TRANSPORT_ERROR",
            LoadError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            LoadError::NotFound(_) => "NOT_FOUND",
            LoadError::UpstreamData(_) => "UPSTREAM_DATA_ERROR",
            LoadError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

pub(crate) fn validate_page_request(page: u32, limit: u32) -> LoadResult<()> {
    if page < 1 {
        return Err(LoadError::InvalidRequest(format!(
            "page must be >= 1, got {page}"
        )));
    }
    if limit == 0 {
        return Err(LoadError::InvalidRequest(
            "limit must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_page_request() {
        assert!(validate_page_request(1, 1).is_ok());
        assert!(matches!(
            validate_page_request(0, 10),
            Err(LoadError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_page_request(3, 0),
            Err(LoadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_display_and_code() {
        let e = LoadError::NotFound("abc".to_string());
        assert_eq!(e.to_string(), "Dataset not found: abc");
        assert_eq!(e.code(), "NOT_FOUND");
        assert_eq!(
            LoadError::Transport("500 Internal Server Error".into()).to_string(),
            "Failed to fetch data: 500 Internal Server Error"
        );
    }
}
