//! Framework-agnostic endpoint handlers for the dataset API.
//!
//! Each handler returns an [`ApiReply`] that any HTTP server can write out
//! as-is: status, headers and a JSON body in the envelope the client parses.

use crate::dal::DatasetStore;
use crate::error::LoadError;
use crate::service::fetch_dataset_page;
use serde_json::{json, Value};
use std::time::Instant;

pub const SERVICE_NAME: &str = "rowpager-api";
pub const PAGE_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=60";
const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;
/// Names the deployment in health replies; unset means "development".
pub const ENVIRONMENT_VAR: &str = "ROWPAGER_ENV";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ApiReply {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    fn with_header(mut self, name: &str, value: String) -> Self {
        self.headers.push((name.to_string(), value));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn error(status: u16, code: &str, message: &str) -> Self {
        Self::json(
            status,
            json!({"success": false, "error": {"code": code, "message": message}}),
        )
    }

    fn from_load_error(e: &LoadError) -> Self {
        match e {
            LoadError::NotFound(_) => Self::error(404, e.code(), "Dataset not found"),
            LoadError::InvalidRequest(msg) => Self::error(400, e.code(), msg),
            _ => {
                tracing::error!(error = %e, "request failed");
                Self::error(500, "INTERNAL_SERVER_ERROR", "An unexpected error occurred")
            }
        }
    }
}

/// `page` and `limit` from a raw query string such as `page=2&limit=1000`.
/// A missing page is 1 and values below 1 are clamped; a missing limit is 10
/// and must be positive.
pub fn parse_page_query(query: &str) -> Result<(u32, u32), LoadError> {
    let mut page = DEFAULT_PAGE;
    let mut limit = DEFAULT_LIMIT;
    for pair in query.trim_start_matches('?').split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "page" if !value.is_empty() => {
                let n: i64 = value.parse().map_err(|_| {
                    LoadError::InvalidRequest(format!("page must be an integer, got {value:?}"))
                })?;
                page = n.clamp(1, i64::from(u32::MAX)) as u32;
            }
            "limit" if !value.is_empty() => {
                let n: i64 = value.parse().map_err(|_| {
                    LoadError::InvalidRequest(format!("limit must be an integer, got {value:?}"))
                })?;
                if n <= 0 {
                    return Err(LoadError::InvalidRequest(
                        "limit must be greater than 0".to_string(),
                    ));
                }
                limit = n.min(i64::from(u32::MAX)) as u32;
            }
            _ => {}
        }
    }
    Ok((page, limit))
}

/// `GET /datasets`
pub fn list_datasets_handler(store: &dyn DatasetStore) -> ApiReply {
    match store.list_datasets() {
        Ok(datasets) => ApiReply::json(200, json!({"success": true, "data": datasets})),
        Err(e) => {
            tracing::error!(error = %e, "listing datasets failed");
            ApiReply::json(
                500,
                json!({"success": false, "message": "Error fetching datasets"}),
            )
        }
    }
}

/// `GET /datasets/{id}?page=&limit=`
pub fn page_handler(store: &dyn DatasetStore, dataset_id: &str, query: &str) -> ApiReply {
    let (page, limit) = match parse_page_query(query) {
        Ok(parsed) => parsed,
        Err(e) => return ApiReply::from_load_error(&e),
    };
    match fetch_dataset_page(store, dataset_id, page, limit) {
        Ok(result) => {
            let body = json!({
                "success": true,
                "data": {
                    "datasetId": result.dataset_id,
                    "datasetName": result.dataset_name,
                    "headers": result.headers,
                    "rows": result.rows,
                    "totalCount": result.pagination.total,
                    "hasNext": result.pagination.has_next,
                    "pagination": result.pagination,
                }
            });
            ApiReply::json(200, body)
                .with_header("Cache-Control", PAGE_CACHE_CONTROL.to_string())
                .with_header("ETag", format!("\"{dataset_id}-{page}-{limit}\""))
        }
        Err(e) => ApiReply::from_load_error(&e),
    }
}

/// Resident and total virtual memory in MB, from `/proc/self/status`.
fn process_memory_mb() -> Option<(u64, u64)> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let field_kb = |name: &str| -> Option<u64> {
        status
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
    };
    Some((field_kb("VmRSS:")? / 1024, field_kb("VmSize:")? / 1024))
}

fn environment() -> String {
    std::env::var(ENVIRONMENT_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "development".to_string())
}

/// `GET /health`: 200 when the store answers its ping, 503 with the ping
/// error otherwise.
pub fn health_handler(store: &dyn DatasetStore, started_at: Instant) -> ApiReply {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match store.ping() {
        Ok(()) => {
            let mut body = json!({
                "status": "healthy",
                "timestamp": timestamp,
                "service": SERVICE_NAME,
                "database": "connected",
                "uptime": started_at.elapsed().as_secs_f64(),
                "environment": environment(),
            });
            if let Some((used, total)) = process_memory_mb() {
                body["memory"] = json!({"used": used, "total": total, "unit": "MB"});
            }
            ApiReply::json(200, body)
        }
        Err(e) => {
            tracing::warn!(error = %e, "health check ping failed");
            let body = json!({
                "status": "unhealthy",
                "timestamp": timestamp,
                "service": SERVICE_NAME,
                "database": "disconnected",
                "error": e.to_string(),
                "environment": environment(),
            });
            ApiReply::json(503, body)
        }
    }
}
