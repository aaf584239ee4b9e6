mod common;

use common::{init_tracing, row_number, NumberedSource};
use rowpager_lib::loader::{LoaderSettings, SettleOutcome};
use rowpager_lib::{FetchRequest, LoaderState, PageCache, ScrollEvent, ScrollLoader};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ROW_HEIGHT: f64 = 50.0;
const VIEWPORT: f64 = 600.0;

fn settings() -> LoaderSettings {
    LoaderSettings {
        threshold: 0.8,
        cooldown: Duration::from_millis(100),
        row_height: ROW_HEIGHT,
        page_size: 1000,
    }
}

fn resolve(
    loader: &mut ScrollLoader,
    cache: &PageCache,
    request: &FetchRequest,
    now: Instant,
) -> SettleOutcome {
    let result = cache.get(request.dataset_id(), request.page(), request.limit);
    loader.on_page_settled(&request.ticket, result, now)
}

#[test]
fn test_scrolling_loads_every_page_in_order_then_stops() {
    init_tracing();
    let source = Arc::new(NumberedSource::new(&[("big", 2500)]));
    let cache = PageCache::new(source.clone());
    let mut loader = ScrollLoader::new(settings());
    let mut now = Instant::now();

    let first = loader.select_dataset("big");
    resolve(&mut loader, &cache, &first, now);
    assert_eq!(loader.store().len(), 1000);

    // 80% of 1000 rows at 50 per row.
    now += Duration::from_secs(1);
    assert!(loader
        .on_scroll(ScrollEvent::user(39_000.0, VIEWPORT), now)
        .is_none());
    let second = loader
        .on_scroll(ScrollEvent::user(40_000.0, VIEWPORT), now)
        .expect("page 2 requested past the threshold");
    assert_eq!(second.page(), 2);
    resolve(&mut loader, &cache, &second, now);
    assert_eq!(loader.store().len(), 2000);

    now += Duration::from_secs(1);
    let third = loader
        .on_scroll(ScrollEvent::user(80_000.0, VIEWPORT), now)
        .expect("page 3 requested");
    assert_eq!(
        resolve(&mut loader, &cache, &third, now),
        SettleOutcome::Applied { page: 3, added: 500 }
    );

    let store = loader.store();
    assert_eq!(store.len(), 2500);
    assert!(!store.has_more());
    assert_eq!(store.total_count(), Some(2500));
    assert_eq!(loader.state(), LoaderState::Exhausted);
    let numbers: Vec<i64> = store.rows().iter().filter_map(row_number).collect();
    assert_eq!(numbers, (0..2500).collect::<Vec<i64>>());

    now += Duration::from_secs(1);
    for offset in [100_000.0, 110_000.0, 124_400.0] {
        assert!(loader
            .on_scroll(ScrollEvent::user(offset, VIEWPORT), now)
            .is_none());
    }
    assert_eq!(source.request_count(), 3);
}

#[test]
fn test_scroll_burst_with_fetch_in_flight_issues_one_request() {
    init_tracing();
    let source = Arc::new(NumberedSource::new(&[("big", 5000)]));
    let cache = PageCache::new(source.clone());
    let mut loader = ScrollLoader::new(settings());
    let t0 = Instant::now();

    let first = loader.select_dataset("big");
    resolve(&mut loader, &cache, &first, t0);

    let later = t0 + Duration::from_secs(1);
    let requests: Vec<FetchRequest> = (0..50)
        .filter_map(|i| {
            let offset = 40_000.0 + f64::from(i) * 10.0;
            loader.on_scroll(ScrollEvent::user(offset, VIEWPORT), later)
        })
        .collect();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].page(), 2);
    assert_eq!(loader.in_flight(), Some(&requests[0].ticket));
}

#[test]
fn test_dataset_switch_discards_pending_result() {
    init_tracing();
    let source = Arc::new(NumberedSource::new(&[("d1", 3000), ("d2", 40)]));
    source.block("d1");
    let cache = Arc::new(PageCache::new(source.clone()));
    let mut loader = ScrollLoader::new(settings());
    let now = Instant::now();

    let d1 = loader.select_dataset("d1");
    let pending = {
        let cache = cache.clone();
        let request = d1.clone();
        thread::spawn(move || cache.get(request.dataset_id(), request.page(), request.limit))
    };
    while source.request_count() == 0 {
        thread::sleep(Duration::from_millis(5));
    }

    let d2 = loader.select_dataset("d2");
    assert!(loader.store().is_empty());
    resolve(&mut loader, &cache, &d2, now);
    assert_eq!(loader.store().len(), 40);

    source.release("d1");
    let late = pending.join().unwrap();
    assert_eq!(late.as_ref().map(|p| p.rows.len()).ok(), Some(1000));
    assert_eq!(
        loader.on_page_settled(&d1.ticket, late, now),
        SettleOutcome::Ignored
    );
    assert_eq!(loader.store().dataset_id(), Some("d2"));
    assert_eq!(loader.store().len(), 40);
    assert_eq!(loader.state(), LoaderState::Exhausted);
}

#[test]
fn test_revisiting_dataset_is_served_from_cache() {
    init_tracing();
    let source = Arc::new(NumberedSource::new(&[("a", 1500), ("b", 10)]));
    let cache = PageCache::new(source.clone());
    let mut loader = ScrollLoader::new(settings());
    let now = Instant::now();

    for id in ["a", "b", "a"] {
        let request = loader.select_dataset(id);
        resolve(&mut loader, &cache, &request, now);
    }
    assert_eq!(loader.store().len(), 1000);
    assert_eq!(source.request_count(), 2);
    assert_eq!(cache.stats().hits, 1);

    // After invalidation the next selection goes back to the source.
    assert_eq!(cache.invalidate("a"), 1);
    let request = loader.select_dataset("a");
    resolve(&mut loader, &cache, &request, now);
    assert_eq!(source.request_count(), 3);
}

#[test]
fn test_unknown_dataset_fails_and_retry_reissues_page_one() {
    init_tracing();
    let source = Arc::new(NumberedSource::new(&[("a", 10)]));
    let cache = PageCache::new(source.clone());
    let mut loader = ScrollLoader::new(settings());
    let now = Instant::now();

    let request = loader.select_dataset("missing");
    let outcome = resolve(&mut loader, &cache, &request, now);
    assert!(matches!(outcome, SettleOutcome::Failed { page: 1, .. }));
    assert_eq!(
        loader.store().last_error(),
        Some("Dataset not found: missing")
    );
    assert!(cache.is_empty());

    let retry = loader.retry().expect("retry from empty");
    assert_eq!(retry.page(), 1);
    resolve(&mut loader, &cache, &retry, now);
    assert_eq!(source.request_count(), 2);
}
