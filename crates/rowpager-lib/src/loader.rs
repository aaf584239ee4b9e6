//! Scroll-driven loader: decides when the next page is needed and makes sure
//! only one fetch per selection is ever in flight.
//!
//! The loader never performs I/O. It hands out [`FetchRequest`]s, and the
//! caller reports their outcome through [`ScrollLoader::on_page_settled`].
//! Time is always passed in so tests can drive the cooldown.

use crate::error::LoadResult;
use crate::model::PageResponse;
use crate::store::{AppendOutcome, RowStore, SessionId};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// No dataset selected.
    Idle,
    InitialLoading,
    Ready,
    LoadingMore,
    /// Halted until [`ScrollLoader::retry`].
    Failed,
    /// Every row is loaded.
    Exhausted,
}

impl LoaderState {
    pub fn label(self) -> &'static str {
        match self {
            LoaderState::Idle => "idle",
            LoaderState::InitialLoading => "loading",
            LoaderState::Ready => "ready",
            LoaderState::LoadingMore => "loading more",
            LoaderState::Failed => "failed",
            LoaderState::Exhausted => "complete",
        }
    }
}

/// Token for the one fetch the loader is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub session: SessionId,
    pub dataset_id: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub limit: u32,
}

impl FetchRequest {
    pub fn dataset_id(&self) -> &str {
        &self.ticket.dataset_id
    }

    pub fn page(&self) -> u32 {
        self.ticket.page
    }
}

/// A viewport scroll observation. Units are arbitrary but must match
/// `row_height` (terminal lines, pixels, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    pub offset: f64,
    pub viewport_height: f64,
    /// Jumps made by the application (scroll-to-top on reset, etc.) never load.
    pub programmatic: bool,
}

impl ScrollEvent {
    pub fn user(offset: f64, viewport_height: f64) -> Self {
        Self {
            offset,
            viewport_height,
            programmatic: false,
        }
    }

    pub fn programmatic(offset: f64, viewport_height: f64) -> Self {
        Self {
            offset,
            viewport_height,
            programmatic: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoaderSettings {
    /// Fraction of the loaded content height that must be scrolled past.
    pub threshold: f64,
    pub cooldown: Duration,
    pub row_height: f64,
    pub page_size: u32,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            row_height: 1.0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    Applied { page: u32, added: usize },
    Failed { page: u32, message: String },
    /// Not the fetch we were waiting for; nothing changed.
    Ignored,
}

#[derive(Debug)]
pub struct ScrollLoader {
    settings: LoaderSettings,
    store: RowStore,
    state: LoaderState,
    in_flight: Option<FetchTicket>,
    cooldown_until: Option<Instant>,
    last_offset: f64,
    /// Scroll that wanted the next page while the latch was closed.
    deferred: Option<ScrollEvent>,
}

impl ScrollLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            settings,
            store: RowStore::new(),
            state: LoaderState::Idle,
            in_flight: None,
            cooldown_until: None,
            last_offset: 0.0,
            deferred: None,
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn in_flight(&self) -> Option<&FetchTicket> {
        self.in_flight.as_ref()
    }

    /// Column headers to show until the first page brings the real ones.
    pub fn hint_headers(&mut self, headers: &[String]) {
        self.store.set_headers_if_empty(headers);
    }

    pub fn loaded_height(&self) -> f64 {
        self.store.len() as f64 * self.settings.row_height
    }

    /// Resets the row store for `dataset_id` and asks for page 1. Any fetch
    /// still running for the previous selection becomes a no-op.
    pub fn select_dataset(&mut self, dataset_id: &str) -> FetchRequest {
        let session = self.store.reset(dataset_id);
        self.in_flight = None;
        self.cooldown_until = None;
        self.last_offset = 0.0;
        self.deferred = None;
        self.state = LoaderState::InitialLoading;
        self.issue(session, dataset_id.to_string(), 1)
    }

    fn issue(&mut self, session: SessionId, dataset_id: String, page: u32) -> FetchRequest {
        let ticket = FetchTicket {
            session,
            dataset_id,
            page,
        };
        self.store.begin_load(page);
        self.in_flight = Some(ticket.clone());
        tracing::debug!(
            dataset_id = %ticket.dataset_id,
            page,
            session = session.value(),
            "issuing page request"
        );
        FetchRequest {
            ticket,
            limit: self.settings.page_size,
        }
    }

    fn latch_free(&self, now: Instant) -> bool {
        self.in_flight.is_none() && self.cooldown_until.is_none_or(|until| now >= until)
    }

    fn next_page_request(&mut self) -> Option<FetchRequest> {
        let dataset_id = self.store.dataset_id()?.to_string();
        let page = self.store.current_page() + 1;
        self.state = LoaderState::LoadingMore;
        self.deferred = None;
        Some(self.issue(self.store.session(), dataset_id, page))
    }

    fn can_load_more(&self, now: Instant) -> bool {
        self.state == LoaderState::Ready && self.store.has_more() && self.latch_free(now)
    }

    fn wants_next_page(&self, event: &ScrollEvent) -> bool {
        let loaded = self.loaded_height();
        let past_threshold = event.offset >= self.settings.threshold * loaded;
        // A viewport taller than the unread tail can never reach the threshold.
        let at_bottom = event.offset + event.viewport_height >= loaded;
        let underfilled = loaded < event.viewport_height;
        past_threshold || at_bottom || underfilled
    }

    /// Feeds one scroll observation. Returns the request for the next page
    /// when this event crosses the load threshold.
    ///
    /// A forward scroll that crosses it while a fetch is in flight or the
    /// cooldown runs is kept and replayed by [`ScrollLoader::fill_viewport`].
    /// At the bottom of the table no later scroll can move forward again.
    pub fn on_scroll(&mut self, event: ScrollEvent, now: Instant) -> Option<FetchRequest> {
        let forward = event.offset > self.last_offset;
        let backward = event.offset < self.last_offset;
        self.last_offset = event.offset;
        if event.programmatic || backward {
            self.deferred = None;
            return None;
        }
        let loading = matches!(self.state, LoaderState::Ready | LoaderState::LoadingMore);
        if !forward || !loading || !self.store.has_more() || !self.wants_next_page(&event) {
            return None;
        }
        if self.can_load_more(now) {
            self.next_page_request()
        } else {
            tracing::debug!(offset = event.offset, "deferring load until the latch frees");
            self.deferred = Some(event);
            None
        }
    }

    /// True while a deferred scroll is waiting for the latch.
    pub fn has_deferred_load(&self) -> bool {
        self.deferred.is_some()
    }

    /// Loads the next page when what is loaded cannot fill the viewport, so
    /// a short first page does not leave the user without a way to scroll.
    /// Also replays a deferred scroll once the latch is free, dropping it
    /// if the rows that landed since moved the threshold past it.
    pub fn fill_viewport(&mut self, viewport_height: f64, now: Instant) -> Option<FetchRequest> {
        if !self.can_load_more(now) {
            return None;
        }
        if self.loaded_height() < viewport_height {
            return self.next_page_request();
        }
        match self.deferred.take() {
            Some(event) if self.wants_next_page(&event) => self.next_page_request(),
            _ => None,
        }
    }

    /// Applies the outcome of a fetch this loader issued.
    pub fn on_page_settled(
        &mut self,
        ticket: &FetchTicket,
        result: LoadResult<Arc<PageResponse>>,
        now: Instant,
    ) -> SettleOutcome {
        if self.in_flight.as_ref() != Some(ticket) {
            tracing::warn!(
                dataset_id = %ticket.dataset_id,
                page = ticket.page,
                "ignoring completion for a fetch no longer awaited"
            );
            return SettleOutcome::Ignored;
        }
        self.in_flight = None;
        self.cooldown_until = Some(now + self.settings.cooldown);

        match result {
            Ok(response) => {
                match self.store.append_page(
                    ticket.session,
                    &ticket.dataset_id,
                    ticket.page,
                    &response,
                ) {
                    AppendOutcome::Appended { added, .. } => {
                        self.state = if self.store.has_more() {
                            LoaderState::Ready
                        } else {
                            self.deferred = None;
                            LoaderState::Exhausted
                        };
                        SettleOutcome::Applied {
                            page: ticket.page,
                            added,
                        }
                    }
                    AppendOutcome::Stale => SettleOutcome::Ignored,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    dataset_id = %ticket.dataset_id,
                    page = ticket.page,
                    error = %message,
                    "page fetch failed"
                );
                self.store.fail(message.clone());
                self.state = LoaderState::Failed;
                self.deferred = None;
                SettleOutcome::Failed {
                    page: ticket.page,
                    message,
                }
            }
        }
    }

    /// Re-issues the page that failed. With nothing loaded yet this is a
    /// retry from empty of page 1.
    pub fn retry(&mut self) -> Option<FetchRequest> {
        if self.state != LoaderState::Failed {
            return None;
        }
        let dataset_id = self.store.dataset_id()?.to_string();
        let session = self.store.session();
        if self.store.is_empty() {
            self.state = LoaderState::InitialLoading;
            Some(self.issue(session, dataset_id, 1))
        } else {
            let page = self.store.current_page() + 1;
            self.state = LoaderState::LoadingMore;
            Some(self.issue(session, dataset_id, page))
        }
    }
}
