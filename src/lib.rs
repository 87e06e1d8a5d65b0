//! Canary-RS: the search and ask core of an embeddable documentation widget
//!
//! Providers answer queries from a local full-text index or a hosted API.
//! Their raw results are ranked into uniform references, and controllers
//! publish the outcome of the latest query while discarding superseded ones.

pub mod ask;
pub mod config;
pub mod dispatch;
pub mod network;
pub mod providers;
pub mod ranking;
pub mod references;

pub use ask::{AskController, AskState};
pub use config::Settings;
pub use dispatch::{DispatchState, DispatchStatus, SearchController};
pub use providers::{Mode, Provider, ProviderError, ProviderLoader, ProviderRegistry};
pub use references::{AskDelta, Reference};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
