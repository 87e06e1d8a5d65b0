//! Search and ask providers
//!
//! Defines the Provider trait and builds a mode-keyed registry of providers
//! from configuration.

mod cached;
mod loader;
mod registry;
mod traits;

// Provider implementations
pub mod cloud;
pub mod local;

pub use cached::{query_cache_key, CachedProvider};
pub use cloud::CloudProvider;
pub use loader::ProviderLoader;
pub use local::LocalIndex;
pub use registry::ProviderRegistry;
pub use traits::*;
