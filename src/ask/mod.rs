//! Streamed answers
//!
//! Like [`dispatch`](crate::dispatch), but the provider reports its answer
//! incrementally as [`AskDelta`](crate::references::AskDelta)s which are folded
//! into an [`AskState`].

mod controller;
mod state;

pub use controller::AskController;
pub use state::{apply_delta, AskState};
