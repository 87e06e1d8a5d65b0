//! Settings structures for Canary-RS configuration

use crate::providers::{Mode, ProviderError};
use crate::ranking::{NormalizeOptions, UrlRewrite};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main settings structure matching canary.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub outgoing: OutgoingSettings,
    pub cache: CacheSettings,
    pub providers: Vec<ProviderConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            outgoing: OutgoingSettings::default(),
            cache: CacheSettings::default(),
            providers: default_providers(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with environment variables (CANARY_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    fn merge_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("CANARY_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Some(val) = var("CANARY_REQUEST_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                self.outgoing.request_timeout = timeout;
            }
        }

        // Credentials only fill in what the file left out
        let base_url = var("CANARY_BASE_URL");
        let api_key = var("CANARY_API_KEY");
        for provider in self
            .providers
            .iter_mut()
            .filter(|p| p.kind == ProviderKind::Cloud)
        {
            if provider.base_url.is_none() {
                provider.base_url = base_url.clone();
            }
            if provider.api_key.is_none() {
                provider.api_key = api_key.clone();
            }
        }
    }

    /// Get provider config by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug logging
    pub debug: bool,
    /// Name reported in logs and the user agent
    pub instance_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            instance_name: "Canary".to_string(),
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Appended to the default user agent
    pub useragent_suffix: Option<String>,
    /// Pool max size
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 10.0,
            useragent_suffix: None,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Search result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Time to live of a cached result set in seconds
    pub ttl_seconds: u64,
    /// Maximum number of cached queries per provider
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_capacity: 1000,
        }
    }
}

/// Backend family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local full-text index file
    Local,
    /// Hosted search and ask API
    Cloud,
}

/// Individual provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name (unique identifier)
    pub name: String,
    /// Backend family
    pub kind: ProviderKind,
    /// Modes this provider is registered for
    pub modes: Vec<Mode>,
    /// Whether provider is disabled
    pub disabled: bool,
    /// Location of the backend index
    pub path: Option<String>,
    /// Cap on distinct parent pages
    pub max_pages: usize,
    /// Cap on ranked sub-results
    pub max_sub_results: usize,
    /// Backend-specific weighting table
    pub ranking: HashMap<String, f64>,
    /// Rewrite of backend URLs onto the consuming site
    pub url_rewrite: Option<UrlRewrite>,
    /// Hosted API root
    pub base_url: Option<String>,
    /// Hosted API key
    pub api_key: Option<String>,
    /// Memoise search results
    pub cache: bool,
    /// Custom timeout for this provider in seconds
    pub timeout: Option<f64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ProviderKind::Local,
            modes: vec![Mode::Search],
            disabled: false,
            path: None,
            max_pages: crate::ranking::DEFAULT_MAX_PAGES,
            max_sub_results: crate::ranking::DEFAULT_MAX_SUB_RESULTS,
            ranking: HashMap::new(),
            url_rewrite: None,
            base_url: None,
            api_key: None,
            cache: true,
            timeout: None,
        }
    }
}

impl ProviderConfig {
    /// Normalizer options derived from this provider's limits
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_pages: self.max_pages,
            max_sub_results: self.max_sub_results,
            url_rewrite: self.url_rewrite.clone(),
        }
    }

    /// Reject configurations the provider cannot start with
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.name.is_empty() {
            return Err(ProviderError::init("<unnamed>", "provider name is empty"));
        }
        if self.max_pages == 0 || self.max_sub_results == 0 {
            return Err(ProviderError::init(
                &self.name,
                "max_pages and max_sub_results must be positive",
            ));
        }
        if self.modes.is_empty() {
            return Err(ProviderError::init(&self.name, "no modes configured"));
        }
        if self.kind == ProviderKind::Local && self.modes.contains(&Mode::Ask) {
            return Err(ProviderError::init(
                &self.name,
                "local index providers cannot serve ask mode",
            ));
        }
        if self.kind == ProviderKind::Cloud && self.base_url.is_none() {
            return Err(ProviderError::init(&self.name, "base_url is required"));
        }
        Ok(())
    }
}

/// Default provider configurations
fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "local".to_string(),
        kind: ProviderKind::Local,
        ..Default::default()
    }]
}
