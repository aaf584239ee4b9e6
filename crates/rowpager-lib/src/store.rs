//! Incremental row store: one contiguous, append-only row sequence per
//! dataset selection.

use crate::model::{PageResponse, Row};

/// Identifies one dataset selection. Bumped on every reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(u64);

impl SessionId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// What happened to a settled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Rows were added; `truncated` counts surplus rows dropped past `totalCount`.
    Appended { added: usize, truncated: usize },
    /// The completion belongs to an older session, another dataset, or an
    /// unexpected page.
    Stale,
}

#[derive(Debug, Default)]
pub struct RowStore {
    session: SessionId,
    dataset_id: Option<String>,
    rows: Vec<Row>,
    headers: Vec<String>,
    total_count: Option<u64>,
    current_page: u32,
    has_more: bool,
    is_initial_loading: bool,
    is_loading_more: bool,
    last_error: Option<String>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new selection. Everything from the previous one is gone
    /// before this returns, and its completions will no longer match.
    pub fn reset(&mut self, dataset_id: &str) -> SessionId {
        let session = SessionId(self.session.0 + 1);
        *self = Self {
            session,
            dataset_id: Some(dataset_id.to_string()),
            has_more: true,
            is_initial_loading: true,
            ..Self::default()
        };
        tracing::info!(dataset_id, session = session.0, "row store reset");
        session
    }

    /// True if a completion tagged `(session, dataset_id, page)` may be applied.
    pub fn accepts(&self, session: SessionId, dataset_id: &str, page: u32) -> bool {
        session == self.session
            && self.dataset_id.as_deref() == Some(dataset_id)
            && (page == 1 || page == self.current_page + 1)
    }

    /// Marks the start of a fetch for `page`.
    pub fn begin_load(&mut self, page: u32) {
        self.last_error = None;
        if page == 1 {
            self.is_initial_loading = true;
        } else {
            self.is_loading_more = true;
        }
    }

    /// Applies a settled page. Page 1 replaces the rows (initial load or a
    /// retry from empty); later pages are concatenated.
    pub fn append_page(
        &mut self,
        session: SessionId,
        dataset_id: &str,
        page: u32,
        response: &PageResponse,
    ) -> AppendOutcome {
        if !self.accepts(session, dataset_id, page) {
            tracing::warn!(
                dataset_id,
                page,
                session = session.0,
                current_session = self.session.0,
                "discarding stale page"
            );
            return AppendOutcome::Stale;
        }

        if page == 1 {
            self.rows.clear();
        }
        let room = usize::try_from(response.total_count)
            .unwrap_or(usize::MAX)
            .saturating_sub(self.rows.len());
        let added = response.rows.len().min(room);
        let truncated = response.rows.len() - added;
        self.rows.extend(response.rows.iter().take(added).cloned());

        if !response.headers.is_empty() {
            self.headers = response.headers.clone();
        }
        self.total_count = Some(response.total_count);
        self.current_page = page;
        self.has_more = response.has_next && truncated == 0;
        if u64::try_from(self.rows.len()).unwrap_or(u64::MAX) >= response.total_count {
            self.has_more = false;
        }
        self.is_initial_loading = false;
        self.is_loading_more = false;
        self.last_error = None;

        if truncated > 0 {
            tracing::warn!(
                dataset_id,
                page,
                truncated,
                total = response.total_count,
                "page overflows totalCount, dropping surplus rows"
            );
        }
        tracing::info!(
            dataset_id,
            page,
            added,
            rows = self.rows.len(),
            has_more = self.has_more,
            "page appended"
        );
        AppendOutcome::Appended { added, truncated }
    }

    /// Records a failed fetch. Rows stay as they were.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.is_initial_loading = false;
        self.is_loading_more = false;
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.dataset_id.as_deref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Header fallback used before the first page arrives.
    pub fn set_headers_if_empty(&mut self, headers: &[String]) {
        if self.headers.is_empty() {
            self.headers = headers.to_vec();
        }
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_initial_loading(&self) -> bool {
        self.is_initial_loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
