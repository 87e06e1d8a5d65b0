//! HTTP client for hosted provider APIs

use crate::config::OutgoingSettings;
use crate::providers::ProviderError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper with Canary-specific configuration
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
    user_agent: String,
    extra_headers: HashMap<String, String>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> anyhow::Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> anyhow::Result<Self> {
        let default_timeout = Duration::from_secs_f64(settings.request_timeout);

        // No client-wide timeout: ask responses stream for longer than a request
        let mut builder = Client::builder()
            .connect_timeout(default_timeout)
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true)
            .brotli(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let mut user_agent = format!("canary-rs/{}", crate::VERSION);
        if let Some(ref suffix) = settings.useragent_suffix {
            user_agent.push(' ');
            user_agent.push_str(suffix);
        }

        Ok(Self {
            client: builder.build()?,
            default_timeout,
            user_agent,
            extra_headers: settings.extra_headers.clone(),
        })
    }

    fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> RequestBuilder {
        let mut req_builder = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .json(body);

        for (key, value) in &self.extra_headers {
            req_builder = req_builder.header(key, value);
        }

        req_builder
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .post(url, body)
            .header("Accept", "application/json")
            .timeout(timeout.unwrap_or(self.default_timeout))
            .send()
            .await?;

        let response = Self::check_status(response)?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST a JSON body and return the response for incremental reading
    pub async fn post_stream<B>(&self, url: &str, body: &B) -> Result<Response, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .post(url, body)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        Self::check_status(response)
    }

    fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        debug!("{} answered {}", response.url(), status);

        if status.is_success() {
            Ok(response)
        } else {
            Err(ProviderError::Transport(format!(
                "HTTP error: {}",
                status.as_u16()
            )))
        }
    }

    /// Get current user agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
