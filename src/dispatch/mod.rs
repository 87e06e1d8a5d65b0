//! Query dispatch
//!
//! Turns a stream of submitted queries into a sequence of published states,
//! making sure only the latest query's outcome is ever visible.

mod call;
mod controller;
mod state;

pub use call::{CallTracker, Dispatched};
pub use controller::SearchController;
pub use state::{DispatchState, DispatchStatus, ErrorInfo};
