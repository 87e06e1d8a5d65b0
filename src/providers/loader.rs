//! Provider loader for initializing providers from configuration

use super::cached::CachedProvider;
use super::cloud::CloudProvider;
use super::local::LocalIndex;
use super::registry::ProviderRegistry;
use super::traits::{Provider, ProviderError};
use crate::config::{ProviderConfig, ProviderKind, Settings};
use crate::network::HttpClient;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Loader for initializing providers from configuration
pub struct ProviderLoader;

impl ProviderLoader {
    /// Load all enabled providers from settings.
    ///
    /// A provider that fails to initialize is skipped; its modes stay
    /// unserved unless another provider claims them.
    pub async fn load(settings: &Settings, client: &HttpClient) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        for config in &settings.providers {
            if config.disabled {
                info!("Skipping disabled provider: {}", config.name);
                continue;
            }

            match Self::create_provider(config, settings, client).await {
                Ok(provider) => {
                    info!("Loaded provider: {} ({:?})", config.name, config.kind);
                    for mode in &config.modes {
                        registry.register(*mode, Arc::clone(&provider));
                    }
                }
                Err(e) => {
                    warn!("Failed to load provider {}: {}", config.name, e);
                }
            }
        }

        info!("Serving {} modes", registry.len());
        Ok(registry)
    }

    /// Create a provider instance from its configuration
    async fn create_provider(
        config: &ProviderConfig,
        settings: &Settings,
        client: &HttpClient,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        config.validate()?;

        let provider: Arc<dyn Provider> = match config.kind {
            ProviderKind::Local => Arc::new(LocalIndex::open(config).await?),
            ProviderKind::Cloud => Arc::new(CloudProvider::new(config, client.clone())?),
        };

        if config.cache {
            Ok(Arc::new(CachedProvider::with_settings(
                provider,
                &settings.cache,
            )))
        } else {
            Ok(provider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Mode;

    fn settings(yaml: &str) -> Settings {
        Settings::from_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_load_cloud_for_both_modes() {
        let settings = settings(
            r#"
providers:
  - name: hosted
    kind: cloud
    modes: [search, ask]
    base_url: https://cloud.example.com
"#,
        );
        let registry = ProviderLoader::load(&settings, &HttpClient::new().unwrap())
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(Mode::Search).unwrap().name(), "hosted");
        assert!(registry.ask_controller().is_ok());
    }

    #[tokio::test]
    async fn test_failed_provider_is_skipped() {
        let settings = settings(
            r#"
providers:
  - name: docs
    kind: local
    path: /nonexistent/canary/index.json
  - name: broken
    kind: cloud
  - name: off
    kind: cloud
    base_url: https://cloud.example.com
    disabled: true
"#,
        );
        let registry = ProviderLoader::load(&settings, &HttpClient::new().unwrap())
            .await
            .unwrap();

        assert!(registry.is_empty());
        assert!(matches!(
            registry.search_controller().err().unwrap(),
            ProviderError::NoProvider(Mode::Search)
        ));
    }

    #[tokio::test]
    async fn test_later_provider_takes_mode() {
        let settings = settings(
            r#"
providers:
  - name: first
    kind: cloud
    base_url: https://one.example.com
    cache: false
  - name: second
    kind: cloud
    base_url: https://two.example.com
"#,
        );
        let registry = ProviderLoader::load(&settings, &HttpClient::new().unwrap())
            .await
            .unwrap();

        assert_eq!(registry.modes(), vec![Mode::Search]);
        assert_eq!(registry.get(Mode::Search).unwrap().name(), "second");
    }
}
