//! Published state of a search dispatch

use crate::providers::ProviderError;
use crate::references::Reference;
use serde::Serialize;
use tracing::debug;

/// Lifecycle of the current call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    #[default]
    Idle,
    Pending,
    Ready,
    Error,
}

/// User-visible description of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
}

impl From<&ProviderError> for ErrorInfo {
    fn from(e: &ProviderError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// Snapshot published to subscribers after every transition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchState {
    pub query: String,
    /// Identity of the call that produced this state
    pub generation: u64,
    pub status: DispatchStatus,
    pub results: Vec<Reference>,
    pub error: Option<ErrorInfo>,
}

impl DispatchState {
    pub fn pending(query: impl Into<String>, generation: u64) -> Self {
        Self {
            query: query.into(),
            generation,
            status: DispatchStatus::Pending,
            ..Default::default()
        }
    }

    pub fn idle(generation: u64) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DispatchStatus::Pending
    }

    /// Mark the state idle for cancellation `generation`.
    ///
    /// A state already published by a newer call is left alone.
    pub(crate) fn cancel(&mut self, generation: u64) -> bool {
        if self.generation >= generation {
            return false;
        }
        self.generation = generation;
        self.status = DispatchStatus::Idle;
        true
    }

    /// Apply the outcome of call `generation`.
    ///
    /// Returns `false`, leaving the state untouched, when the call has been
    /// superseded or was cancelled.
    pub(crate) fn resolve(
        &mut self,
        generation: u64,
        outcome: Result<Option<Vec<Reference>>, ProviderError>,
    ) -> bool {
        if self.generation != generation || !self.is_pending() {
            return false;
        }

        match outcome {
            Ok(Some(results)) => {
                self.status = DispatchStatus::Ready;
                self.results = results;
                self.error = None;
            }
            Ok(None) => {
                debug!("Provider had no opinion on '{}'", self.query);
                self.status = DispatchStatus::Ready;
                self.results = Vec::new();
                self.error = None;
            }
            Err(ProviderError::Cancelled) => return false,
            Err(e) => {
                self.status = DispatchStatus::Error;
                self.results = Vec::new();
                self.error = Some(ErrorInfo::from(&e));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_current_call() {
        let mut state = DispatchState::pending("rust", 3);
        let results = vec![Reference::new("/a", "A")];

        assert!(state.resolve(3, Ok(Some(results.clone()))));
        assert_eq!(state.status, DispatchStatus::Ready);
        assert_eq!(state.results, results);
    }

    #[test]
    fn test_resolve_superseded_call() {
        let mut state = DispatchState::pending("b", 2);
        assert!(!state.resolve(1, Ok(Some(vec![Reference::new("/a", "A")]))));
        assert_eq!(state, DispatchState::pending("b", 2));
    }

    #[test]
    fn test_no_opinion_is_empty_ready() {
        let mut state = DispatchState::pending("rust", 1);
        assert!(state.resolve(1, Ok(None)));
        assert_eq!(state.status, DispatchStatus::Ready);
        assert!(state.results.is_empty());
    }

    #[test]
    fn test_errors() {
        let mut state = DispatchState::pending("rust", 1);
        assert!(!state.resolve(1, Err(ProviderError::Cancelled)));
        assert!(state.is_pending());

        assert!(state.resolve(1, Err(ProviderError::Transport("HTTP error: 503".into()))));
        assert_eq!(state.status, DispatchStatus::Error);
        assert!(state.error.unwrap().message.contains("HTTP error: 503"));
    }

    #[test]
    fn test_cancel_never_rolls_back_newer_call() {
        let mut state = DispatchState::pending("x", 6);
        assert!(!state.cancel(5));
        assert_eq!(state, DispatchState::pending("x", 6));

        assert!(state.resolve(6, Ok(Some(vec![Reference::new("/x", "X")]))));
        assert_eq!(state.status, DispatchStatus::Ready);

        assert!(state.cancel(7));
        assert_eq!(state.status, DispatchStatus::Idle);
        assert_eq!(state.generation, 7);
    }

    #[test]
    fn test_resolved_state_is_final() {
        let mut state = DispatchState::pending("rust", 1);
        assert!(state.resolve(1, Ok(Some(vec![]))));
        assert!(!state.resolve(1, Err(ProviderError::Transport("late".into()))));
        assert_eq!(state.status, DispatchStatus::Ready);
    }
}
