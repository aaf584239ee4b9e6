#![allow(dead_code)]

use polars::prelude::*;
use rowpager_lib::{CellValue, DatasetMeta, LoadError, LoadResult, PageResponse, PageSource, Row};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness. `RUST_LOG` picks the level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// In-memory page source: each dataset is the integers `0..total` in a
/// single `n` column. Records every page request.
pub struct NumberedSource {
    datasets: Vec<(String, u64)>,
    requests: Mutex<Vec<(String, u32, u32)>>,
    blocked: Mutex<HashSet<String>>,
    released: Condvar,
}

impl NumberedSource {
    pub fn new(datasets: &[(&str, u64)]) -> Self {
        Self {
            datasets: datasets
                .iter()
                .map(|(id, total)| (id.to_string(), *total))
                .collect(),
            requests: Mutex::new(Vec::new()),
            blocked: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Fetches for `dataset_id` wait until [`NumberedSource::release`].
    pub fn block(&self, dataset_id: &str) {
        self.blocked.lock().unwrap().insert(dataset_id.to_string());
    }

    pub fn release(&self, dataset_id: &str) {
        self.blocked.lock().unwrap().remove(dataset_id);
        self.released.notify_all();
    }

    pub fn requests(&self) -> Vec<(String, u32, u32)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn total(&self, dataset_id: &str) -> Option<u64> {
        self.datasets
            .iter()
            .find(|(id, _)| id == dataset_id)
            .map(|(_, total)| *total)
    }
}

impl PageSource for NumberedSource {
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
        Ok(self
            .datasets
            .iter()
            .map(|(id, total)| DatasetMeta {
                id: id.clone(),
                name: id.clone(),
                description: String::new(),
                total_row_count: *total,
                column_headers: vec!["n".to_string()],
            })
            .collect())
    }

    fn fetch_page(&self, dataset_id: &str, page: u32, limit: u32) -> LoadResult<PageResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((dataset_id.to_string(), page, limit));

        let mut blocked = self.blocked.lock().unwrap();
        while blocked.contains(dataset_id) {
            blocked = self.released.wait(blocked).unwrap();
        }
        drop(blocked);

        let total = self
            .total(dataset_id)
            .ok_or_else(|| LoadError::NotFound(dataset_id.to_string()))?;
        let start = u64::from(page - 1) * u64::from(limit);
        let end = (start + u64::from(limit)).min(total);
        let rows = (start..end).map(numbered_row).collect();
        Ok(PageResponse {
            rows,
            headers: vec!["n".to_string()],
            total_count: total,
            has_next: end < total,
        })
    }
}

pub fn numbered_row(n: u64) -> Row {
    let mut row = Row::new();
    row.insert("n".to_string(), CellValue::from_u64(n));
    row
}

/// Value of the `n` column, for order checks.
pub fn row_number(row: &Row) -> Option<i64> {
    match row.get("n")? {
        CellValue::Int(n) => Some(*n),
        _ => None,
    }
}

/// Writes a `rows`-row CSV (`id`, `label`) into `dir` and returns its path.
pub fn write_sample_csv(dir: &Path, name: &str, rows: i64) -> PathBuf {
    let path = dir.join(name);
    let mut df = df!(
        "id" => (0..rows).collect::<Vec<i64>>(),
        "label" => (0..rows).map(|i| format!("item_{}", i)).collect::<Vec<String>>()
    )
    .unwrap();
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();
    path
}
