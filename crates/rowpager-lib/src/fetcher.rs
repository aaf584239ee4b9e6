//! Runs blocking fetches on worker threads and posts the outcome back to the
//! event loop, so a slow endpoint never stalls rendering.

use crate::cache::PageCache;
use crate::loader::FetchRequest;
use crate::AppEvent;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Resolves `request` through the cache and sends `AppEvent::PageSettled`.
/// If the receiver is gone the app has exited and the result is dropped.
pub fn spawn_page_fetch(
    cache: Arc<PageCache>,
    request: FetchRequest,
    events: Sender<AppEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let FetchRequest { ticket, limit } = request;
        let result = cache.get(&ticket.dataset_id, ticket.page, limit);
        if events
            .send(AppEvent::PageSettled { ticket, result })
            .is_err()
        {
            tracing::debug!("event loop closed before page settled");
        }
    })
}

/// Lists datasets from the cache's source and sends `AppEvent::DatasetsLoaded`.
/// Listings are not cached.
pub fn spawn_dataset_listing(cache: Arc<PageCache>, events: Sender<AppEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        let result = cache.source().list_datasets();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "dataset listing failed");
        }
        let _ = events.send(AppEvent::DatasetsLoaded(result));
    })
}
