//! Accumulated state of a streamed answer

use crate::dispatch::{DispatchStatus, ErrorInfo};
use crate::providers::ProviderError;
use crate::references::{AskDelta, Reference};
use serde::Serialize;

/// Snapshot of the current ask, published after every applied delta
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AskState {
    pub query: String,
    /// Identity of the ask that produced this state
    pub generation: u64,
    /// Correlation id sent to the backend
    pub session_id: u32,
    pub status: DispatchStatus,
    /// True from dispatch until the first delta arrives
    pub loading: bool,
    /// Concatenated progress content
    pub response: String,
    /// Latest reference list
    pub references: Vec<Reference>,
    pub error: Option<ErrorInfo>,
}

impl AskState {
    /// Fresh accumulators for a new ask
    pub fn pending(query: impl Into<String>, generation: u64, session_id: u32) -> Self {
        Self {
            query: query.into(),
            generation,
            session_id,
            status: DispatchStatus::Pending,
            loading: true,
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

    /// Stop for cancellation `generation`, keeping the partial answer.
    ///
    /// A state already published by a newer ask is left alone.
    pub(crate) fn cancel(&mut self, generation: u64) -> bool {
        if self.generation >= generation {
            return false;
        }
        self.generation = generation;
        self.status = DispatchStatus::Idle;
        self.loading = false;
        true
    }

    /// Apply the terminal outcome of ask `generation`
    pub(crate) fn finish(&mut self, generation: u64, outcome: Result<(), ProviderError>) -> bool {
        if self.generation != generation || !self.is_pending() {
            return false;
        }

        match outcome {
            Ok(()) => {
                self.status = DispatchStatus::Ready;
                self.error = None;
            }
            Err(ProviderError::Cancelled) => return false,
            Err(e) => {
                self.status = DispatchStatus::Error;
                self.error = Some(ErrorInfo::from(&e));
            }
        }
        self.loading = false;
        true
    }
}

/// Fold one delta into the accumulated answer.
///
/// Progress is appended in arrival order; a reference list replaces the
/// previous one.
pub fn apply_delta(mut state: AskState, delta: AskDelta) -> AskState {
    match delta {
        AskDelta::Progress { content } => state.response.push_str(&content),
        AskDelta::References { items } => state.references = items,
    }
    state.loading = false;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_in_order() {
        let refs = vec![Reference::new("/a", "A")];
        let deltas = vec![
            AskDelta::progress("He"),
            AskDelta::progress("llo"),
            AskDelta::references(refs.clone()),
        ];

        let state = deltas
            .into_iter()
            .fold(AskState::pending("hi", 1, 7), apply_delta);

        assert_eq!(state.response, "Hello");
        assert_eq!(state.references, refs);
        assert!(!state.loading);
        assert!(state.is_pending());
    }

    #[test]
    fn test_first_delta_clears_loading() {
        let state = AskState::pending("hi", 1, 7);
        assert!(state.loading);

        let state = apply_delta(state, AskDelta::references(vec![]));
        assert!(!state.loading);
        assert!(state.response.is_empty());
    }

    #[test]
    fn test_references_replace() {
        let state = apply_delta(
            AskState::pending("hi", 1, 7),
            AskDelta::references(vec![Reference::new("/a", "A"), Reference::new("/b", "B")]),
        );
        let state = apply_delta(state, AskDelta::references(vec![Reference::new("/c", "C")]));

        assert_eq!(state.references.len(), 1);
        assert_eq!(state.references[0].url, "/c");
    }

    #[test]
    fn test_cancel_keeps_partial_answer() {
        let state = apply_delta(AskState::pending("hi", 2, 7), AskDelta::progress("He"));

        let mut stale = state.clone();
        assert!(!stale.cancel(1));
        assert_eq!(stale, state);

        let mut cancelled = state;
        assert!(cancelled.cancel(3));
        assert_eq!(cancelled.status, DispatchStatus::Idle);
        assert_eq!(cancelled.response, "He");
        assert!(!cancelled.loading);
    }

    #[test]
    fn test_finish() {
        let mut state = AskState::pending("hi", 2, 7);
        assert!(!state.finish(1, Ok(())));
        assert!(!state.finish(2, Err(ProviderError::Cancelled)));
        assert!(state.loading);

        assert!(state.finish(2, Err(ProviderError::Transport("reset".to_string()))));
        assert_eq!(state.status, DispatchStatus::Error);
        assert!(!state.loading);
        assert!(state.error.unwrap().message.contains("reset"));
    }
}
