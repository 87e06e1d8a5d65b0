//! Reference model shared by every provider and controller
//!
//! A `Reference` is a single retrievable result; an `AskDelta` is one
//! incremental update of a streamed answer.

mod types;

pub use types::*;
