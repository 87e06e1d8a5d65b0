//! Call identity and cancellation bookkeeping shared by the controllers

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tracks the single outstanding call of a controller.
///
/// Every `begin` or `cancel` produces a new generation and cancels the token
/// of the call it replaces.
#[derive(Debug, Default)]
pub struct CallTracker {
    generation: u64,
    query: Option<String>,
    cancel: Option<CancellationToken>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the most recent call or cancellation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Query of the most recent call still in effect
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Start a call for `query` unless it is already the current one
    pub fn begin(&mut self, query: &str) -> Option<(u64, CancellationToken)> {
        if self.query.as_deref() == Some(query) {
            debug!("Query '{}' is already current, not dispatching", query);
            return None;
        }
        Some(self.restart(query))
    }

    /// Start a call for `query` even if it matches the current one
    pub fn restart(&mut self, query: &str) -> (u64, CancellationToken) {
        self.retire();
        self.generation += 1;
        self.query = Some(query.to_string());

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        (self.generation, token)
    }

    /// Cancel the outstanding call and forget its query
    pub fn cancel(&mut self) -> u64 {
        self.retire();
        self.generation += 1;
        self.query = None;
        self.generation
    }

    fn retire(&mut self) {
        if let Some(token) = self.cancel.take() {
            debug!("Cancelling call #{}", self.generation);
            token.cancel();
        }
    }
}

/// Handle to one dispatched call
#[derive(Debug)]
pub struct Dispatched {
    pub generation: u64,
    task: JoinHandle<()>,
}

impl Dispatched {
    pub(crate) fn new(generation: u64, task: JoinHandle<()>) -> Self {
        Self { generation, task }
    }

    /// Wait until the call's outcome has been applied or discarded
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Call #{} task failed: {}", self.generation, e);
        }
    }
}
