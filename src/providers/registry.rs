//! Provider registry keyed by interaction mode

use super::traits::{Mode, Provider, ProviderError};
use crate::ask::AskController;
use crate::dispatch::SearchController;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The provider selected for each mode.
///
/// Providers are not merged: registering a second provider for a mode
/// replaces the first.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<Mode, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for `mode`
    pub fn register(&mut self, mode: Mode, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        if let Some(previous) = self.providers.insert(mode, provider) {
            info!(
                "Provider {} replaces {} for {} mode",
                name,
                previous.name(),
                mode
            );
        } else {
            debug!("Registered provider {} for {} mode", name, mode);
        }
    }

    /// Get the provider for a mode
    pub fn get(&self, mode: Mode) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&mode)
    }

    pub fn contains(&self, mode: Mode) -> bool {
        self.providers.contains_key(&mode)
    }

    /// Modes with a registered provider
    pub fn modes(&self) -> Vec<Mode> {
        self.providers.keys().copied().collect()
    }

    /// Get number of registered modes
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn require(&self, mode: Mode) -> Result<Arc<dyn Provider>, ProviderError> {
        self.get(mode)
            .cloned()
            .ok_or(ProviderError::NoProvider(mode))
    }

    /// Controller running searches against the search provider
    pub fn search_controller(&self) -> Result<SearchController, ProviderError> {
        Ok(SearchController::new(self.require(Mode::Search)?))
    }

    /// Controller streaming answers from the ask provider
    pub fn ask_controller(&self) -> Result<AskController, ProviderError> {
        let provider = self.require(Mode::Ask)?;
        if !provider.supports_ask() {
            return Err(ProviderError::Unsupported {
                provider: provider.name().to_string(),
                mode: Mode::Ask,
            });
        }
        Ok(AskController::new(provider))
    }
}
