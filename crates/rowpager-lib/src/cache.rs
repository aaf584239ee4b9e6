//! Request cache and deduplicator in front of a [`PageSource`].
//!
//! Successful pages are kept for a TTL; concurrent requests for the same
//! `(dataset, page, limit)` key share one underlying call. Failures are never
//! cached, and every caller that joined a failed request receives the error.

use crate::client::PageSource;
use crate::error::{LoadError, LoadResult};
use crate::model::{PageKey, PageResponse};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default time a fetched page stays servable.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Time source for entry expiry, injectable so tests control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counters shown in the debug row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a valid entry.
    pub hits: u64,
    /// Attached to a request already in flight.
    pub joins: u64,
    /// Underlying calls issued.
    pub fetches: u64,
    /// Underlying calls that failed.
    pub failures: u64,
}

struct CacheEntry {
    payload: Arc<PageResponse>,
    fetched_at: Instant,
}

type Shared = LoadResult<Arc<PageResponse>>;

/// Result slot shared by every caller of one in-flight request.
#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Shared>>,
    settled: Condvar,
}

impl InFlight {
    fn complete(&self, result: Shared) {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(result);
        self.settled.notify_all();
    }

    fn wait(&self) -> Shared {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.settled.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PageKey, CacheEntry>,
    pending: HashMap<PageKey, Arc<InFlight>>,
    stats: CacheStats,
}

enum Lookup {
    Hit(Arc<PageResponse>),
    Join(Arc<InFlight>),
    Fetch(Arc<InFlight>),
}

pub struct PageCache {
    source: Arc<dyn PageSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl PageCache {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_TTL,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) < self.ttl
    }

    /// Resolve one page: valid entry, else join the pending request, else fetch.
    /// Blocks the calling thread until the page settles.
    pub fn get(&self, dataset_id: &str, page: u32, limit: u32) -> LoadResult<Arc<PageResponse>> {
        crate::error::validate_page_request(page, limit)?;
        let key = PageKey::new(dataset_id, page, limit);

        let lookup = {
            let mut state = self.lock();
            let now = self.clock.now();
            let fresh = state
                .entries
                .get(&key)
                .filter(|entry| self.is_fresh(entry, now))
                .map(|entry| Arc::clone(&entry.payload));
            if let Some(payload) = fresh {
                state.stats.hits += 1;
                Lookup::Hit(payload)
            } else if let Some(flight) = state.pending.get(&key).cloned() {
                state.stats.joins += 1;
                Lookup::Join(flight)
            } else {
                let flight = Arc::new(InFlight::default());
                state.pending.insert(key.clone(), Arc::clone(&flight));
                state.stats.fetches += 1;
                Lookup::Fetch(flight)
            }
        };

        match lookup {
            Lookup::Hit(payload) => {
                tracing::debug!(%key, "cache hit");
                Ok(payload)
            }
            Lookup::Join(flight) => {
                tracing::debug!(%key, "joining pending request");
                flight.wait()
            }
            Lookup::Fetch(flight) => {
                tracing::debug!(%key, "cache miss, fetching");
                let mut settle = Settlement {
                    cache: self,
                    key,
                    flight,
                    done: false,
                };
                let result = self
                    .source
                    .fetch_page(dataset_id, page, limit)
                    .map(Arc::new);
                settle.finish(result.clone());
                result
            }
        }
    }

    /// Drops every entry of `dataset_id`. Requests already in flight are not
    /// affected. Returns the number of entries removed.
    pub fn invalidate(&self, dataset_id: &str) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| key.dataset_id != dataset_id);
        let removed = before - state.entries.len();
        tracing::debug!(dataset_id, removed, "invalidated cached pages");
        removed
    }

    /// True when a non-expired entry exists for the key.
    pub fn contains_fresh(&self, dataset_id: &str, page: u32, limit: u32) -> bool {
        let key = PageKey::new(dataset_id, page, limit);
        let state = self.lock();
        let now = self.clock.now();
        state
            .entries
            .get(&key)
            .is_some_and(|entry| self.is_fresh(entry, now))
    }

    /// Stored entries, including expired ones not yet superseded.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

/// Publishes the outcome of one underlying call. Dropping it unsettled (the
/// source panicked) still releases the waiters.
struct Settlement<'a> {
    cache: &'a PageCache,
    key: PageKey,
    flight: Arc<InFlight>,
    done: bool,
}

impl Settlement<'_> {
    fn finish(&mut self, result: Shared) {
        {
            let mut state = self.cache.lock();
            state.pending.remove(&self.key);
            match &result {
                Ok(payload) => {
                    let fetched_at = self.cache.clock.now();
                    state.entries.insert(
                        self.key.clone(),
                        CacheEntry {
                            payload: Arc::clone(payload),
                            fetched_at,
                        },
                    );
                    tracing::debug!(
                        key = %self.key,
                        rows = payload.rows.len(),
                        total = payload.total_count,
                        has_next = payload.has_next,
                        "page cached"
                    );
                }
                Err(e) => {
                    state.stats.failures += 1;
                    tracing::warn!(key = %self.key, error = %e, "page request failed");
                }
            }
        }
        self.flight.complete(result);
        self.done = true;
    }
}

impl Drop for Settlement<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.finish(Err(LoadError::Transport("request abandoned".to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, DatasetMeta, Row};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn page_of(n: usize, has_next: bool) -> PageResponse {
        let rows = (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("i".to_string(), CellValue::Int(i as i64));
                row
            })
            .collect();
        PageResponse {
            rows,
            headers: vec!["i".to_string()],
            total_count: 10_000,
            has_next,
        }
    }

    /// Counts calls; fails while `fail` is set.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail: Mutex<bool>,
    }

    impl PageSource for CountingSource {
        fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
            Ok(Vec::new())
        }

        fn fetch_page(&self, _id: &str, _page: u32, limit: u32) -> LoadResult<PageResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(LoadError::Transport("503 Service Unavailable".to_string()));
            }
            Ok(page_of(limit as usize, true))
        }
    }

    /// Blocks every call until the test sends a result down the channel.
    struct GatedSource {
        calls: AtomicUsize,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<LoadResult<PageResponse>>>,
    }

    impl PageSource for GatedSource {
        fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
            Ok(Vec::new())
        }

        fn fetch_page(&self, _id: &str, _page: u32, _limit: u32) -> LoadResult<PageResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap()
        }
    }

    fn gated() -> (
        Arc<GatedSource>,
        mpsc::Receiver<()>,
        mpsc::Sender<LoadResult<PageResponse>>,
    ) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = Arc::new(GatedSource {
            calls: AtomicUsize::new(0),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        });
        (source, started_rx, release_tx)
    }

    fn wait_for_joins(cache: &PageCache, joins: u64) {
        for _ in 0..500 {
            if cache.stats().joins >= joins {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("callers never joined the pending request");
    }

    #[test]
    fn test_concurrent_identical_requests_share_one_call() {
        let (source, started, release) = gated();
        let cache = Arc::new(PageCache::new(source.clone()));

        let first = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("D", 1, 1000))
        };
        started.recv().unwrap();
        let second = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("D", 1, 1000))
        };
        wait_for_joins(&cache, 1);
        assert_eq!(cache.pending_len(), 1);

        release.send(Ok(page_of(1000, true))).unwrap();
        let a = first.join().unwrap().unwrap();
        let b = second.join().unwrap().unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.stats().fetches, 1);
    }

    #[test]
    fn test_failure_reaches_every_waiter_and_is_not_cached() {
        let (source, started, release) = gated();
        let cache = Arc::new(PageCache::new(source.clone()));

        let callers: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get("D", 2, 100))
            })
            .collect();
        started.recv().unwrap();
        wait_for_joins(&cache, 2);

        let err = LoadError::Transport("500 Internal Server Error".to_string());
        release.send(Err(err.clone())).unwrap();
        for caller in callers {
            assert_eq!(caller.join().unwrap(), Err(err.clone()));
        }
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.pending_len(), 0);

        // The next call retries from scratch.
        let retry = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("D", 2, 100))
        };
        started.recv().unwrap();
        release.send(Ok(page_of(100, true))).unwrap();
        assert_eq!(retry.join().unwrap().unwrap().rows.len(), 100);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = PageCache::new(source.clone()).with_clock(Arc::new(clock.clone()));

        let first = cache.get("D", 1, 10).unwrap();
        clock.advance(Duration::from_secs(299));
        let again = cache.get("D", 1, 10).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(2));
        assert!(!cache.contains_fresh("D", 1, 10));
        let refetched = cache.get("D", 1, 10).unwrap();
        assert!(!Arc::ptr_eq(&first, &refetched));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_share() {
        let source = Arc::new(CountingSource::default());
        let cache = PageCache::new(source.clone());
        cache.get("D", 1, 10).unwrap();
        cache.get("D", 1, 20).unwrap();
        cache.get("D", 2, 10).unwrap();
        cache.get("E", 1, 10).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_invalidate_only_touches_one_dataset() {
        let source = Arc::new(CountingSource::default());
        let cache = PageCache::new(source.clone());
        cache.get("D", 1, 10).unwrap();
        cache.get("D", 2, 10).unwrap();
        cache.get("DX", 1, 10).unwrap();

        assert_eq!(cache.invalidate("D"), 2);
        assert!(cache.contains_fresh("DX", 1, 10));
        assert!(!cache.contains_fresh("D", 1, 10));
        cache.get("D", 1, 10).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_failed_call_counts_and_recovers() {
        let source = Arc::new(CountingSource::default());
        let cache = PageCache::new(source.clone());
        *source.fail.lock().unwrap() = true;
        assert!(cache.get("D", 1, 10).is_err());
        *source.fail.lock().unwrap() = false;
        assert!(cache.get("D", 1, 10).is_ok());
        let stats = cache.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_invalid_page_never_reaches_source() {
        let source = Arc::new(CountingSource::default());
        let cache = PageCache::new(source.clone());
        assert!(matches!(
            cache.get("D", 0, 10),
            Err(LoadError::InvalidRequest(_))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_source_releases_waiters() {
        struct PanickingSource;
        impl PageSource for PanickingSource {
            fn list_datasets(&self) -> LoadResult<Vec<DatasetMeta>> {
                Ok(Vec::new())
            }
            fn fetch_page(&self, _: &str, _: u32, _: u32) -> LoadResult<PageResponse> {
                panic!("source blew up");
            }
        }
        let cache = Arc::new(PageCache::new(Arc::new(PanickingSource)));
        let handle = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("D", 1, 10))
        };
        assert!(handle.join().is_err());
        assert_eq!(cache.pending_len(), 0);
    }
}
