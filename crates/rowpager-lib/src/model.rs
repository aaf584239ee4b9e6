//! Wire-level data model shared by the client, the cache and the server-side handlers.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest integer magnitude a JSON consumer can represent losslessly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Dataset metadata as returned by the listing endpoint. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMeta {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(alias = "totalRows")]
    pub total_row_count: u64,
    #[serde(alias = "headers")]
    pub column_headers: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single scalar cell. Rows are heterogeneous across datasets, so values stay opaque.
///
/// Decoding keeps integers exact: anything outside the JSON-safe range,
/// including values past `i64`, becomes a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Integer cell that stays exact for JSON consumers: values outside
    /// +/- `MAX_SAFE_INTEGER` become decimal strings.
    pub fn from_i64(v: i64) -> Self {
        if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&v) {
            CellValue::Int(v)
        } else {
            CellValue::Text(v.to_string())
        }
    }

    pub fn from_u64(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Self::from_i64(i),
            Err(_) => CellValue::Text(v.to_string()),
        }
    }

    /// Re-applies the JSON-safe integer rule to an already-decoded value.
    pub fn json_safe(self) -> Self {
        match self {
            CellValue::Int(v) => Self::from_i64(v),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

struct CellValueVisitor;

impl<'de> Visitor<'de> for CellValueVisitor {
    type Value = CellValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a boolean, a number or a string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<CellValue, D::Error> {
        CellValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CellValue, E> {
        Ok(CellValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CellValue, E> {
        Ok(CellValue::from_i64(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CellValue, E> {
        Ok(CellValue::from_u64(v))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<CellValue, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => CellValue::from_i64(i),
            Err(_) => CellValue::Text(v.to_string()),
        })
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<CellValue, E> {
        Ok(match u64::try_from(v) {
            Ok(u) => CellValue::from_u64(u),
            Err(_) => CellValue::Text(v.to_string()),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CellValue, E> {
        Ok(CellValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CellValue, E> {
        Ok(CellValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CellValue, E> {
        Ok(CellValue::Text(v))
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellValueVisitor)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// One row keyed by column header. No identity beyond its position in the page.
pub type Row = BTreeMap<String, CellValue>;

/// Identifies a unique page request: (dataset id, page number, page size).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub dataset_id: String,
    pub page: u32,
    pub limit: u32,
}

impl PageKey {
    pub fn new(dataset_id: impl Into<String>, page: u32, limit: u32) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            page,
            limit,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.dataset_id, self.page, self.limit)
    }
}

/// Normalized response for one page, whatever shape the endpoint used.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub rows: Vec<Row>,
    #[serde(default)]
    pub headers: Vec<String>,
    pub total_count: u64,
    pub has_next: bool,
}

impl PageResponse {
    /// Applies the JSON-safe integer rule to every cell.
    pub fn into_json_safe(mut self) -> Self {
        for row in &mut self.rows {
            for value in row.values_mut() {
                let v = std::mem::replace(value, CellValue::Null);
                *value = v.json_safe();
            }
        }
        self
    }
}

/// Zero-based row offset of `page` (1-based) for the given page size.
pub fn page_offset(page: u32, limit: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(limit)
}
