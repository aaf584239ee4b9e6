//! Data access layer: a registry of datasets backed by polars `LazyFrame`s.
//!
//! Every dataset names a backing table; each table has one query handler with
//! a fixed sort key, so page boundaries are stable between requests.

use crate::error::{LoadError, LoadResult};
use crate::model::{CellValue, DatasetMeta, Row};
use polars::prelude::*;
use rowpager_cli::FileFormat;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Rows of one dataset at a given offset, with the dataset's total.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSlice {
    pub dataset_id: String,
    pub dataset_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Read access to the datasets a page service serves.
pub trait DatasetStore: Send + Sync {
    /// All datasets, ordered by name.
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>>;

    fn find_rows(&self, dataset_id: &str, offset: u64, limit: u32) -> LoadResult<DatasetSlice>;

    /// Cheap liveness check for the health probe.
    fn ping(&self) -> LoadResult<()>;
}

/// Query handler for one backing table.
struct TableHandler {
    frame: LazyFrame,
    order_by: Option<String>,
}

impl TableHandler {
    fn page(&self, offset: u64, limit: u32) -> PolarsResult<DataFrame> {
        let mut lf = self.frame.clone();
        if let Some(key) = &self.order_by {
            lf = lf.sort_by_exprs(vec![col(key.as_str())], SortMultipleOptions::default());
        }
        lf.slice(offset as i64, limit as IdxSize).collect()
    }
}

fn table_name(dataset_name: &str) -> String {
    dataset_name.to_lowercase()
}

fn upstream(e: PolarsError) -> LoadError {
    LoadError::UpstreamData(e.to_string())
}

/// JSON-friendly view of one polars value.
pub fn cell_from_any(value: AnyValue<'_>) -> CellValue {
    match value {
        AnyValue::Null => CellValue::Null,
        AnyValue::Boolean(b) => CellValue::Bool(b),
        AnyValue::Int8(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int16(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int32(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int64(v) => CellValue::from_i64(v),
        AnyValue::UInt8(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt16(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt32(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt64(v) => CellValue::from_u64(v),
        AnyValue::Float32(v) => CellValue::Float(f64::from(v)),
        AnyValue::Float64(v) => CellValue::Float(v),
        AnyValue::String(s) => CellValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => CellValue::Text(s.to_string()),
        other => CellValue::Text(other.str_value().into_owned()),
    }
}

/// Converts a collected frame into header names and keyed rows.
pub fn frame_to_rows(df: &DataFrame) -> PolarsResult<(Vec<String>, Vec<Row>)> {
    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Row::new();
        for (name, column) in headers.iter().zip(df.get_columns()) {
            row.insert(name.clone(), cell_from_any(column.get(i)?));
        }
        rows.push(row);
    }
    Ok((headers, rows))
}

fn count_rows(lf: &LazyFrame) -> PolarsResult<u64> {
    let df = lf.clone().select([len()]).collect()?;
    let count = match df.get_columns().first().map(|c| c.get(0)).transpose()? {
        Some(AnyValue::UInt32(n)) => u64::from(n),
        Some(AnyValue::UInt64(n)) => n,
        _ => 0,
    };
    Ok(count)
}

/// Polars-backed [`DatasetStore`].
#[derive(Default)]
pub struct FrameStore {
    datasets: HashMap<String, DatasetMeta>,
    tables: HashMap<String, TableHandler>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers dataset metadata only. A dataset whose table was never
    /// registered is listed but fails with `UpstreamData` when read.
    pub fn register_dataset(&mut self, meta: DatasetMeta) {
        self.datasets.insert(meta.id.clone(), meta);
    }

    /// Registers the query handler for a table. `table` is matched
    /// case-insensitively against dataset names.
    pub fn register_table(&mut self, table: &str, frame: LazyFrame, order_by: Option<&str>) {
        self.tables.insert(
            table_name(table),
            TableHandler {
                frame,
                order_by: order_by.map(str::to_string),
            },
        );
    }

    /// Registers a dataset together with its table, reading the row count and
    /// column names from the frame.
    pub fn register_frame(
        &mut self,
        id: &str,
        name: &str,
        description: &str,
        frame: LazyFrame,
        order_by: Option<&str>,
    ) -> PolarsResult<DatasetMeta> {
        let mut probe = frame.clone();
        let schema = probe.collect_schema()?;
        let column_headers = schema.iter_names().map(|n| n.to_string()).collect();
        let meta = DatasetMeta {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            total_row_count: count_rows(&frame)?,
            column_headers,
        };
        self.register_table(name, frame, order_by);
        self.register_dataset(meta.clone());
        Ok(meta)
    }

    /// One dataset per local file. The id and name are the file stem (made
    /// unique with a numeric suffix); files keep their on-disk order.
    pub fn from_paths(paths: &[PathBuf], format: Option<FileFormat>) -> PolarsResult<Self> {
        let mut store = Self::new();
        let mut seen = HashSet::new();
        for path in paths {
            let frame = scan_file(path, format)?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string());
            let mut id = stem.clone();
            let mut n = 2;
            while !seen.insert(id.to_lowercase()) {
                id = format!("{stem}_{n}");
                n += 1;
            }
            let meta = store.register_frame(&id, &id, &path.display().to_string(), frame, None)?;
            tracing::info!(
                dataset = %meta.id,
                rows = meta.total_row_count,
                path = %path.display(),
                "registered local dataset"
            );
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Lazily scans one file, by explicit format or by extension.
pub fn scan_file(path: &Path, format: Option<FileFormat>) -> PolarsResult<LazyFrame> {
    let format = format
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| {
            PolarsError::ComputeError(format!("unknown file format: {}", path.display()).into())
        })?;
    let pl_path = PlPath::Local(std::sync::Arc::from(path));
    match format {
        FileFormat::Csv => LazyCsvReader::new(pl_path).finish(),
        FileFormat::Tsv => LazyCsvReader::new(pl_path).with_separator(b'\t').finish(),
        FileFormat::Parquet => LazyFrame::scan_parquet(pl_path, ScanArgsParquet::default()),
        FileFormat::Arrow => LazyFrame::scan_ipc(pl_path, Default::default(), Default::default()),
        FileFormat::Jsonl => LazyJsonLineReader::new(pl_path).finish(),
    }
}

impl DatasetStore for FrameStore {
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
        let mut datasets: Vec<DatasetMeta> = self.datasets.values().cloned().collect();
        datasets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(datasets)
    }

    fn find_rows(&self, dataset_id: &str, offset: u64, limit: u32) -> LoadResult<DatasetSlice> {
        let meta = self
            .datasets
            .get(dataset_id)
            .ok_or_else(|| LoadError::NotFound(dataset_id.to_string()))?;
        let handler = self.tables.get(&table_name(&meta.name)).ok_or_else(|| {
            LoadError::UpstreamData(format!("No data handler found for dataset: {}", meta.name))
        })?;
        let df = handler.page(offset, limit).map_err(upstream)?;
        let (headers, rows) = frame_to_rows(&df).map_err(upstream)?;
        tracing::debug!(dataset_id, offset, limit, rows = rows.len(), "rows read");
        Ok(DatasetSlice {
            dataset_id: meta.id.clone(),
            dataset_name: meta.name.clone(),
            headers: if headers.is_empty() {
                meta.column_headers.clone()
            } else {
                headers
            },
            rows,
            total: meta.total_row_count,
        })
    }

    fn ping(&self) -> LoadResult<()> {
        for (name, handler) in &self.tables {
            let mut frame = handler.frame.clone();
            frame
                .collect_schema()
                .map_err(|e| LoadError::UpstreamData(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}
