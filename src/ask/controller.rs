//! Streaming ask controller

use super::state::{apply_delta, AskState};
use crate::dispatch::{CallTracker, Dispatched};
use crate::providers::Provider;
use crate::references::AskDelta;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Deltas buffered between the provider and the reducer
const DELTA_BUFFER: usize = 64;

/// Streams answers from one provider into an [`AskState`].
///
/// Each ask starts from empty accumulators. Once an ask is cancelled or
/// superseded, deltas it still emits are dropped.
pub struct AskController {
    provider: Arc<dyn Provider>,
    state: Arc<watch::Sender<AskState>>,
    calls: Mutex<CallTracker>,
}

impl AskController {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let (state, _) = watch::channel(AskState::default());
        Self {
            provider,
            state: Arc::new(state),
            calls: Mutex::new(CallTracker::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn subscribe(&self) -> watch::Receiver<AskState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AskState {
        self.state.borrow().clone()
    }

    fn calls(&self) -> MutexGuard<'_, CallTracker> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask `query`, superseding any outstanding ask.
    ///
    /// A blank query clears the state instead. Must be called within a tokio
    /// runtime.
    pub fn submit(&self, query: &str) -> Option<Dispatched> {
        let query = query.trim();
        let mut calls = self.calls();

        if query.is_empty() {
            let generation = calls.cancel();
            self.state.send_replace(AskState::idle(generation));
            return None;
        }

        let (generation, cancel) = calls.begin(query)?;
        Some(self.dispatch(query, generation, cancel))
    }

    /// Ask the current query again
    pub fn refresh(&self) -> Option<Dispatched> {
        let mut calls = self.calls();
        let query = calls.query()?.to_string();
        if query.is_empty() {
            return None;
        }

        let (generation, cancel) = calls.restart(&query);
        Some(self.dispatch(&query, generation, cancel))
    }

    /// Stop the outstanding ask, keeping whatever was already received
    pub fn cancel(&self) {
        let mut calls = self.calls();
        let generation = calls.cancel();
        if !self.state.send_if_modified(|state| state.cancel(generation)) {
            debug!("Ask cancellation #{} already superseded", generation);
        }
    }

    fn dispatch(&self, query: &str, generation: u64, cancel: CancellationToken) -> Dispatched {
        let session_id: u32 = rand::random();
        debug!(
            "Dispatching ask #{} (session {}) for '{}'",
            generation, session_id, query
        );
        self.state.send_replace(AskState::pending(query, generation, session_id));

        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let query = query.to_string();
        let task = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(DELTA_BUFFER);
            let ask = provider.ask(session_id, &query, tx, cancel.clone());
            tokio::pin!(ask);

            let outcome = loop {
                tokio::select! {
                    biased;
                    Some(delta) = rx.recv() => apply(&state, generation, &cancel, delta),
                    outcome = &mut ask => break outcome,
                }
            };

            // Deltas sent right before returning are still in the channel
            rx.close();
            while let Ok(delta) = rx.try_recv() {
                apply(&state, generation, &cancel, delta);
            }

            if !state.send_if_modified(|current| current.finish(generation, outcome)) {
                debug!("Discarded outcome of ask #{} for '{}'", generation, query);
            }
        });

        Dispatched::new(generation, task)
    }
}

fn apply(
    state: &watch::Sender<AskState>,
    generation: u64,
    cancel: &CancellationToken,
    delta: AskDelta,
) {
    let applied = state.send_if_modified(|current| {
        if cancel.is_cancelled() || current.generation != generation || !current.is_pending() {
            return false;
        }
        *current = apply_delta(std::mem::take(current), delta);
        true
    });

    if !applied {
        debug!("Dropped late delta for ask #{}", generation);
    }
}

impl Drop for AskController {
    fn drop(&mut self) {
        self.calls().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchStatus;
    use crate::providers::{DeltaSender, ProviderError};
    use crate::references::Reference;
    use async_trait::async_trait;

    /// Streams "He", "llo" and one reference
    struct Scripted;

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn search(
            &self,
            _query: &str,
            _cancel: CancellationToken,
        ) -> Result<Option<Vec<Reference>>, ProviderError> {
            Ok(None)
        }

        fn supports_ask(&self) -> bool {
            true
        }

        async fn ask(
            &self,
            _session_id: u32,
            query: &str,
            deltas: DeltaSender,
            _cancel: CancellationToken,
        ) -> Result<(), ProviderError> {
            if query == "fail" {
                deltas.send(AskDelta::progress("partial")).await.ok();
                return Err(ProviderError::Transport("stream reset".to_string()));
            }
            for delta in [
                AskDelta::progress("He"),
                AskDelta::progress("llo"),
                AskDelta::references(vec![Reference::new(format!("/{}", query), query)]),
            ] {
                deltas
                    .send(delta)
                    .await
                    .map_err(|_| ProviderError::Cancelled)?;
            }
            Ok(())
        }
    }

    /// Sends one delta, waits to be released, then keeps sending regardless of cancellation
    struct Stubborn {
        release: watch::Sender<bool>,
    }

    impl Stubborn {
        fn new() -> Self {
            Self {
                release: watch::channel(false).0,
            }
        }
    }

    #[async_trait]
    impl Provider for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        async fn search(
            &self,
            _query: &str,
            _cancel: CancellationToken,
        ) -> Result<Option<Vec<Reference>>, ProviderError> {
            Ok(None)
        }

        fn supports_ask(&self) -> bool {
            true
        }

        async fn ask(
            &self,
            _session_id: u32,
            _query: &str,
            deltas: DeltaSender,
            _cancel: CancellationToken,
        ) -> Result<(), ProviderError> {
            deltas.send(AskDelta::progress("first")).await.ok();
            let mut release = self.release.subscribe();
            let _ = release.wait_for(|released| *released).await;
            deltas.send(AskDelta::progress(" late")).await.ok();
            deltas
                .send(AskDelta::references(vec![Reference::new("/late", "Late")]))
                .await
                .ok();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stream_accumulates() {
        let controller = AskController::new(Arc::new(Scripted));
        controller.submit("greeting").unwrap().join().await;

        let state = controller.state();
        assert_eq!(state.response, "Hello");
        assert_eq!(state.references[0].url, "/greeting");
        assert_eq!(state.status, DispatchStatus::Ready);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_loading_until_first_delta() {
        let provider = Arc::new(Stubborn::new());
        let controller = AskController::new(provider.clone());
        let mut rx = controller.subscribe();

        let ask = controller.submit("q").unwrap();
        assert!(rx.borrow_and_update().loading);

        rx.wait_for(|state| state.response == "first").await.unwrap();
        assert!(!rx.borrow().loading);

        provider.release.send_replace(true);
        ask.join().await;
        assert_eq!(controller.state().response, "first late");
    }

    #[tokio::test]
    async fn test_late_deltas_after_cancel_are_dropped() {
        let provider = Arc::new(Stubborn::new());
        let controller = AskController::new(provider.clone());
        let mut rx = controller.subscribe();

        let ask = controller.submit("q").unwrap();
        rx.wait_for(|state| state.response == "first").await.unwrap();

        controller.cancel();
        provider.release.send_replace(true);
        ask.join().await;

        let state = controller.state();
        assert_eq!(state.response, "first");
        assert!(state.references.is_empty());
        assert_eq!(state.status, DispatchStatus::Idle);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_new_ask_resets_accumulators() {
        let controller = AskController::new(Arc::new(Scripted));
        controller.submit("one").unwrap().join().await;
        assert_eq!(controller.state().response, "Hello");

        let second = controller.submit("two").unwrap();
        let state = controller.state();
        assert!(state.loading);
        assert!(state.references.is_empty());
        assert_eq!(state.query, "two");
        assert!(state.generation > 1);

        second.join().await;
        let state = controller.state();
        assert_eq!(state.response, "Hello");
        assert_eq!(state.references[0].url, "/two");
    }

    #[tokio::test]
    async fn test_superseded_ask_is_dropped() {
        let provider = Arc::new(Stubborn::new());
        let controller = AskController::new(provider.clone());
        let mut rx = controller.subscribe();

        let first = controller.submit("first").unwrap();
        rx.wait_for(|state| state.response == "first").await.unwrap();

        let second = controller.submit("second").unwrap();
        rx.wait_for(|state| state.query == "second" && state.response == "first")
            .await
            .unwrap();

        provider.release.send_replace(true);
        first.join().await;
        second.join().await;

        let state = controller.state();
        assert_eq!(state.query, "second");
        assert_eq!(state.response, "first late");
        assert_eq!(state.references.len(), 1);
        assert_eq!(state.status, DispatchStatus::Ready);
    }

    #[tokio::test]
    async fn test_error_keeps_partial_answer() {
        let controller = AskController::new(Arc::new(Scripted));
        controller.submit("fail").unwrap().join().await;

        let state = controller.state();
        assert_eq!(state.status, DispatchStatus::Error);
        assert_eq!(state.response, "partial");
        assert!(state.error.unwrap().message.contains("stream reset"));
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        struct SearchOnly;

        #[async_trait]
        impl Provider for SearchOnly {
            fn name(&self) -> &str {
                "search-only"
            }

            async fn search(
                &self,
                _query: &str,
                _cancel: CancellationToken,
            ) -> Result<Option<Vec<Reference>>, ProviderError> {
                Ok(Some(vec![]))
            }
        }

        let controller = AskController::new(Arc::new(SearchOnly));
        controller.submit("q").unwrap().join().await;

        let state = controller.state();
        assert_eq!(state.status, DispatchStatus::Error);
        assert!(state.error.unwrap().message.contains("does not support ask"));
    }
}
