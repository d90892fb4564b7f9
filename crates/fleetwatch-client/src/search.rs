//! Debounced search with stale-response suppression.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fleetwatch_core::{Notification, SearchHit};

use crate::api::DashboardApi;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::store::{SearchResults, StateStore};

struct Inner {
    api: Arc<dyn DashboardApi>,
    store: Arc<StateStore>,
    notifier: mpsc::UnboundedSender<Notification>,
    latest_seq: AtomicU64,
    // Serializes the sequence check with the store write.
    apply_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn issue(self: &Arc<Self>, query: String) -> u64 {
        let seq = self.latest_seq.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(seq, query = %query, "issuing search");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.api.search(&query).await;
            inner.apply(seq, query, result).await;
        });
        seq
    }

    async fn apply(&self, seq: u64, query: String, result: Result<Vec<SearchHit>>) -> bool {
        let _lock = self.apply_lock.lock().await;
        let latest = self.latest_seq.load(Ordering::Acquire);
        if seq != latest {
            debug!(seq, latest, "discarding stale search response");
            return false;
        }

        match result {
            Ok(hits) => {
                debug!(seq, hits = hits.len(), "search results applied");
                self.store
                    .set_search_results(SearchResults { query, seq, hits })
                    .await;
                true
            }
            Err(e) => {
                warn!(seq, error = %e, "search failed");
                let _ = self
                    .notifier
                    .send(Notification::error(format!("Search failed: {}", e.friendly_message())));
                false
            }
        }
    }
}

/// Turns keystrokes into at most one search request per quiet period.
pub struct SearchCoordinator {
    inner: Arc<Inner>,
    debounce: Duration,
    min_query_len: usize,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SearchCoordinator {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<StateStore>,
        notifier: mpsc::UnboundedSender<Notification>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                notifier,
                latest_seq: AtomicU64::new(0),
                apply_lock: tokio::sync::Mutex::new(()),
            }),
            debounce: config.debounce(),
            min_query_len: config.min_query_len,
            pending: Mutex::new(None),
        }
    }

    /// Handle one edit of the search box.
    ///
    /// Cancels the pending debounce. Short queries clear the results at once
    /// and invalidate any response still in flight.
    pub async fn on_query_changed(&self, text: &str) {
        self.cancel();

        let query = text.trim().to_string();
        if query.chars().count() < self.min_query_len {
            let _lock = self.inner.apply_lock.lock().await;
            self.inner.latest_seq.fetch_add(1, Ordering::AcqRel);
            self.inner.store.clear_search_results().await;
            return;
        }

        let inner = Arc::clone(&self.inner);
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.issue(query);
        });

        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(handle);
        }
    }

    /// Abort the pending debounce, if any. Requests already issued are not affected.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock()
            && let Some(handle) = pending.take()
        {
            handle.abort();
        }
    }

    /// Sequence number of the most recently issued (or invalidated) query.
    pub fn latest_seq(&self) -> u64 {
        self.inner.latest_seq.load(Ordering::Acquire)
    }
}

impl Drop for SearchCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}
