//! Page service: turns a page request into a dataset slice plus pagination
//! metadata. [`LocalPageSource`] exposes it through [`PageSource`] so local
//! files go through the same cache and loader as a remote API.

use crate::client::PageSource;
use crate::dal::DatasetStore;
use crate::error::{validate_page_request, LoadResult};
use crate::model::{page_offset, DatasetMeta, PageResponse, Row};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(limit.max(1)));
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePage {
    pub dataset_id: String,
    pub dataset_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub pagination: Pagination,
}

impl ServicePage {
    pub fn into_response(self) -> PageResponse {
        PageResponse {
            rows: self.rows,
            headers: self.headers,
            total_count: self.pagination.total,
            has_next: self.pagination.has_next,
        }
    }
}

pub fn fetch_dataset_page(
    store: &dyn DatasetStore,
    dataset_id: &str,
    page: u32,
    limit: u32,
) -> LoadResult<ServicePage> {
    validate_page_request(page, limit)?;
    let offset = page_offset(page, limit);
    let slice = store.find_rows(dataset_id, offset, limit)?;
    let pagination = Pagination::new(page, limit, slice.total);
    Ok(ServicePage {
        dataset_id: slice.dataset_id,
        dataset_name: slice.dataset_name,
        headers: slice.headers,
        rows: slice.rows,
        pagination,
    })
}

/// In-process [`PageSource`] over a [`DatasetStore`].
pub struct LocalPageSource {
    store: Arc<dyn DatasetStore>,
}

impl LocalPageSource {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }
}

impl PageSource for LocalPageSource {
    fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
        self.store.list_datasets()
    }

    fn fetch_page(&self, dataset_id: &str, page: u32, limit: u32) -> LoadResult<PageResponse> {
        let page = fetch_dataset_page(self.store.as_ref(), dataset_id, page, limit)?;
        Ok(page.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dal::FrameStore;
    use crate::error::LoadError;
    use polars::prelude::*;

    #[test]
    fn test_pagination_metadata() {
        let p = Pagination::new(1, 1000, 2500);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let last = Pagination::new(3, 1000, 2500);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Pagination::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    fn local() -> LocalPageSource {
        let mut store = FrameStore::new();
        let frame = df!("n" => (0..25i64).collect::<Vec<_>>()).unwrap().lazy();
        store
            .register_frame("nums", "Numbers", "", frame, Some("n"))
            .unwrap();
        LocalPageSource::new(Arc::new(store))
    }

    #[test]
    fn test_local_source_pages() {
        let source = local();
        let page = source.fetch_page("nums", 3, 10).unwrap();
        assert_eq!(page.rows.len(), 5);
        assert_eq!(page.total_count, 25);
        assert!(!page.has_next);
        assert_eq!(page.rows[0]["n"], crate::model::CellValue::Int(20));
        assert!(source.fetch_page("nums", 2, 10).unwrap().has_next);
    }

    #[test]
    fn test_local_source_errors() {
        let source = local();
        assert!(matches!(
            source.fetch_page("nums", 0, 10),
            Err(LoadError::InvalidRequest(_))
        ));
        assert_eq!(
            source.fetch_page("missing", 1, 10),
            Err(LoadError::NotFound("missing".to_string()))
        );
    }
}
