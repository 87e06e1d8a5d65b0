//! Search dispatch controller

use super::call::{CallTracker, Dispatched};
use super::state::DispatchState;
use crate::providers::Provider;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs searches against one provider and publishes the latest outcome.
///
/// Only the most recently submitted query can change the published state;
/// outcomes of superseded calls are dropped even if their provider ignores
/// cancellation.
pub struct SearchController {
    provider: Arc<dyn Provider>,
    state: Arc<watch::Sender<DispatchState>>,
    calls: Mutex<CallTracker>,
}

impl SearchController {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let (state, _) = watch::channel(DispatchState::default());
        Self {
            provider,
            state: Arc::new(state),
            calls: Mutex::new(CallTracker::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Receive every published state
    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> DispatchState {
        self.state.borrow().clone()
    }

    fn calls(&self) -> MutexGuard<'_, CallTracker> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Search for `query`, superseding any outstanding call.
    ///
    /// A blank query clears the state instead. Returns `None` when nothing
    /// was dispatched. Must be called within a tokio runtime.
    pub fn submit(&self, query: &str) -> Option<Dispatched> {
        let query = query.trim();
        let mut calls = self.calls();

        if query.is_empty() {
            let generation = calls.cancel();
            self.state.send_replace(DispatchState::idle(generation));
            return None;
        }

        let (generation, cancel) = calls.begin(query)?;
        Some(self.dispatch(query, generation, cancel))
    }

    /// Run the current query again
    pub fn refresh(&self) -> Option<Dispatched> {
        let mut calls = self.calls();
        let query = calls.query()?.to_string();
        if query.is_empty() {
            return None;
        }

        let (generation, cancel) = calls.restart(&query);
        Some(self.dispatch(&query, generation, cancel))
    }

    /// Cancel the outstanding call. Its outcome will never be published.
    pub fn cancel(&self) {
        let mut calls = self.calls();
        let generation = calls.cancel();
        if !self.state.send_if_modified(|state| state.cancel(generation)) {
            debug!("Search cancellation #{} already superseded", generation);
        }
    }

    fn dispatch(&self, query: &str, generation: u64, cancel: CancellationToken) -> Dispatched {
        debug!("Dispatching search #{} for '{}'", generation, query);
        self.state.send_replace(DispatchState::pending(query, generation));

        let provider = Arc::clone(&self.provider);
        let warm_query = query.to_string();
        tokio::spawn(async move {
            if let Err(e) = provider.before_search(&warm_query).await {
                debug!("Warm-up for '{}' failed: {}", warm_query, e);
            }
        });

        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let query = query.to_string();
        let task = tokio::spawn(async move {
            let outcome = provider.search(&query, cancel).await;
            let applied = state.send_if_modified(|current| current.resolve(generation, outcome));
            if !applied {
                debug!("Discarded outcome of search #{} for '{}'", generation, query);
            }
        });

        Dispatched::new(generation, task)
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        self.calls().cancel();
    }
}
