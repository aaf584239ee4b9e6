//! Pagination client: one "page N of dataset D with size L" call per request.
//!
//! [`PageSource`] is the seam the cache wraps. [`HttpPageClient`] talks to a
//! remote dataset API; [`crate::service::LocalPageSource`] serves local files.
//! Envelope parsing lives here so both the HTTP client and tests share it.

use crate::error::{LoadError, LoadResult};
use crate::model::{DatasetMeta, PageResponse, Row};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Anything that can list datasets and fetch one page of rows.
pub trait PageSource: Send + Sync {
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>>;

    /// `page` is 1-based; `limit` is the page size. Implementations reject
    /// `page < 1` and `limit == 0` with [`LoadError::InvalidRequest`].
    fn fetch_page(&self, dataset_id: &str, page: u32, limit: u32) -> LoadResult<PageResponse>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The two page shapes in the wild: the flat one and the older
/// nested `{data: {data, headers, total}, pagination}` one.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePage {
    Flat(FlatPage),
    Nested(NestedPage),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatPage {
    rows: Vec<Row>,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(alias = "total")]
    total_count: u64,
    #[serde(default)]
    has_next: Option<bool>,
}

#[derive(Deserialize)]
struct NestedPage {
    data: NestedData,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct NestedData {
    data: Vec<Row>,
    #[serde(default)]
    headers: Vec<String>,
    total: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    has_next: bool,
}

fn envelope_failure(error: Option<ErrorBody>, message: Option<String>, subject: &str) -> LoadError {
    let code = error.as_ref().and_then(|e| e.code.clone());
    let msg = error
        .and_then(|e| e.message)
        .or(message)
        .unwrap_or_else(|| "server reported failure".to_string());
    match code.as_deref() {
        Some("NOT_FOUND") => LoadError::NotFound(subject.to_string()),
        Some("INVALID_REQUEST") => LoadError::InvalidRequest(msg),
        _ => LoadError::Transport(msg),
    }
}

fn decode_envelope<T: DeserializeOwned>(body: &str, subject: &str) -> LoadResult<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| LoadError::MalformedResponse(format!("unexpected payload: {e}")))?;
    if !envelope.success {
        return Err(envelope_failure(envelope.error, envelope.message, subject));
    }
    envelope
        .data
        .ok_or_else(|| LoadError::MalformedResponse("envelope has no data".to_string()))
}

/// Parses a page endpoint body into a normalized [`PageResponse`].
/// When the server omits `hasNext` it is derived as `page * limit < totalCount`.
pub fn parse_page_envelope(
    body: &str,
    dataset_id: &str,
    page: u32,
    limit: u32,
) -> LoadResult<PageResponse> {
    let wire: WirePage = decode_envelope(body, dataset_id)?;
    let derived_has_next =
        |total: u64| u64::from(page).saturating_mul(u64::from(limit)) < total;
    let response = match wire {
        WirePage::Flat(p) => PageResponse {
            has_next: p.has_next.unwrap_or_else(|| derived_has_next(p.total_count)),
            rows: p.rows,
            headers: p.headers,
            total_count: p.total_count,
        },
        WirePage::Nested(p) => PageResponse {
            has_next: p
                .pagination
                .map(|pg| pg.has_next)
                .unwrap_or_else(|| derived_has_next(p.data.total)),
            rows: p.data.data,
            headers: p.data.headers,
            total_count: p.data.total,
        },
    };
    Ok(response.into_json_safe())
}

/// Parses the dataset listing endpoint body.
pub fn parse_datasets_envelope(body: &str) -> LoadResult<Vec<DatasetMeta>> {
    decode_envelope(body, "datasets")
}

/// Blocking HTTP client for the dataset API.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpPageClient {
    base_url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpPageClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn datasets_url(&self) -> String {
        format!("{}/datasets", self.base_url)
    }

    pub fn page_url(&self, dataset_id: &str, page: u32, limit: u32) -> String {
        format!(
            "{}/datasets/{}?page={}&limit={}",
            self.base_url,
            urlencoding::encode(dataset_id),
            page,
            limit
        )
    }

    /// GET `url` and return the body. Non-2xx statuses become `Transport`
    /// unless the body is an error envelope that maps to a narrower kind.
    fn get_body(&self, url: &str, subject: &str) -> LoadResult<String> {
        match ureq::get(url).timeout(self.timeout).call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| LoadError::Transport(format!("could not read response body: {e}"))),
            Err(ureq::Error::Status(code, response)) => {
                let status_text = response.status_text().to_string();
                let body = response.into_string().unwrap_or_default();
                match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                    Ok(envelope) if !envelope.success => {
                        match envelope_failure(envelope.error, envelope.message, subject) {
                            LoadError::Transport(msg) => {
                                Err(LoadError::Transport(format!("{code} {status_text}: {msg}")))
                            }
                            other => Err(other),
                        }
                    }
                    _ => Err(LoadError::Transport(format!("{code} {status_text}"))),
                }
            }
            Err(e) => Err(LoadError::Transport(e.to_string())),
        }
    }
}

#[cfg(feature = "http")]
impl PageSource for HttpPageClient {
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
        let url = self.datasets_url();
        tracing::debug!(%url, "listing datasets");
        let body = self.get_body(&url, "datasets")?;
        parse_datasets_envelope(&body)
    }

    fn fetch_page(&self, dataset_id: &str, page: u32, limit: u32) -> LoadResult<PageResponse> {
        crate::error::validate_page_request(page, limit)?;
        let url = self.page_url(dataset_id, page, limit);
        tracing::debug!(
            %url,
            offset = crate::model::page_offset(page, limit),
            "requesting page"
        );
        let body = self.get_body(&url, dataset_id)?;
        parse_page_envelope(&body, dataset_id, page, limit)
    }
}
