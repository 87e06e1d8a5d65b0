//! Hosted search and ask provider
//!
//! Search is a JSON round trip. Ask answers are streamed as server-sent
//! `data:` lines, each carrying one JSON encoded [`AskDelta`].

use super::traits::*;
use crate::config::ProviderConfig;
use crate::network::HttpClient;
use crate::ranking::{normalize_batch, HostedMatch, NormalizeOptions, RawBatch};
use crate::references::{AskDelta, Reference};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

const SEARCH_PATH: &str = "api/v1/search";
const ASK_PATH: &str = "api/v1/ask";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// `null` when the service declines to answer the query
    #[serde(default)]
    matches: Option<Vec<HostedMatch>>,
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    id: u32,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// Splits a byte stream into lines, tolerating chunk boundaries anywhere
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(i) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + i;
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
            self.scanned = 0;
        }
        self.scanned = self.pending.len();
        lines
    }

    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// Decode one line of the ask stream
fn parse_event_line(line: &str) -> Result<Option<AskDelta>, ProviderError> {
    let line = line.trim_end_matches('\r');

    // Blank separators and `:` comments carry nothing
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let payload = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        // Bare JSON lines are accepted as well
        None if line.starts_with('{') => line,
        None => return Ok(None),
    };

    if payload == "[DONE]" {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(payload)?))
}

/// Provider backed by the hosted API
pub struct CloudProvider {
    name: String,
    client: HttpClient,
    search_url: Url,
    ask_url: Url,
    api_key: Option<String>,
    options: NormalizeOptions,
    timeout: Option<Duration>,
}

impl CloudProvider {
    pub fn new(config: &ProviderConfig, client: HttpClient) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::init(&config.name, "base_url is required"))?;

        let mut base = Url::parse(base_url)
            .map_err(|e| ProviderError::init(&config.name, format!("invalid base_url: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |path: &str| {
            base.join(path)
                .map_err(|e| ProviderError::init(&config.name, e))
        };

        Ok(Self {
            name: config.name.clone(),
            client,
            search_url: join(SEARCH_PATH)?,
            ask_url: join(ASK_PATH)?,
            api_key: config.api_key.clone(),
            options: config.normalize_options(),
            timeout: config.timeout.map(Duration::from_secs_f64),
        })
    }

    /// Forward a delta unless the ask was cancelled or the receiver is gone
    async fn emit(
        deltas: &DeltaSender,
        delta: AskDelta,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            sent = deltas.send(delta) => sent.map_err(|_| ProviderError::Cancelled),
        }
    }
}

#[async_trait]
impl Provider for CloudProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<Reference>>, ProviderError> {
        let body = SearchRequest {
            query,
            key: self.api_key.as_deref(),
        };

        let request =
            self.client
                .post_json::<_, SearchResponse>(self.search_url.as_str(), &body, self.timeout);
        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = request => response?,
        };

        Ok(response.matches.map(|matches| {
            debug!("{} returned {} matches", self.name, matches.len());
            normalize_batch(RawBatch::Hosted(matches), &self.options)
        }))
    }

    fn supports_ask(&self) -> bool {
        true
    }

    async fn ask(
        &self,
        session_id: u32,
        query: &str,
        deltas: DeltaSender,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let body = AskRequest {
            id: session_id,
            query,
            key: self.api_key.as_deref(),
        };

        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = self.client.post_stream(self.ask_url.as_str(), &body) => response?,
        };

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();

        loop {
            // Dropping the stream on cancellation closes the connection
            let chunk = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            for line in lines.push(&chunk?) {
                if let Some(delta) = parse_event_line(&line)? {
                    trace!("session {} delta: {:?}", session_id, delta);
                    Self::emit(&deltas, delta, &cancel).await?;
                }
            }
        }

        if let Some(line) = lines.finish() {
            if let Some(delta) = parse_event_line(&line)? {
                Self::emit(&deltas, delta, &cancel).await?;
            }
        }

        debug!("{} finished ask session {}", self.name, session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> CloudProvider {
        let config = ProviderConfig {
            name: "cloud".to_string(),
            kind: ProviderKind::Cloud,
            base_url: Some(base_url.to_string()),
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        CloudProvider::new(&config, HttpClient::new().unwrap()).unwrap()
    }

    #[test]
    fn test_line_buffer_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"type\":").is_empty());

        let lines = buffer.push(b"\"progress\",\"content\":\"He\"}\r\n\ndata: x");
        assert_eq!(
            lines,
            vec![
                "data: {\"type\":\"progress\",\"content\":\"He\"}\r".to_string(),
                String::new()
            ]
        );
        assert_eq!(buffer.finish().as_deref(), Some("data: x"));
    }

    #[test]
    fn test_line_buffer_long_line_in_many_chunks() {
        let mut buffer = LineBuffer::default();
        for _ in 0..100 {
            assert!(buffer.push(b"abcdefgh").is_empty());
        }
        assert_eq!(buffer.scanned, 800);

        let lines = buffer.push(b"!\nnext");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 801);
        assert!(lines[0].ends_with("gh!"));
        assert_eq!(buffer.scanned, 4);
        assert_eq!(buffer.finish().as_deref(), Some("next"));
    }

    #[test]
    fn test_parse_event_line() {
        assert_eq!(
            parse_event_line("data: {\"type\":\"progress\",\"content\":\"He\"}\r").unwrap(),
            Some(AskDelta::progress("He"))
        );
        assert_eq!(
            parse_event_line("{\"type\":\"progress\",\"content\":\"llo\"}").unwrap(),
            Some(AskDelta::progress("llo"))
        );
        assert_eq!(parse_event_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_event_line("event: message").unwrap(), None);
        assert_eq!(parse_event_line("data: [DONE]").unwrap(), None);
        assert!(matches!(
            parse_event_line("data: {oops"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_urls_keep_base_path() {
        let provider = provider("https://cloud.example.com/tenant");
        assert_eq!(
            provider.search_url.as_str(),
            "https://cloud.example.com/tenant/api/v1/search"
        );
        assert_eq!(
            provider.ask_url.as_str(),
            "https://cloud.example.com/tenant/api/v1/ask"
        );
    }

    #[tokio::test]
    async fn test_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    {"url": "/a", "title": "A", "score": 0.2},
                    {"url": "/b", "title": "B", "sections": [
                        {"url": "/b#x", "title": "X", "excerpt": "x", "score": 0.7}
                    ]}
                ]
            })))
            .mount(&server)
            .await;

        let refs = provider(&server.uri())
            .search("query", CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "/b#x");
        assert_eq!(refs[0].titles, vec!["B".to_string()]);
        assert_eq!(refs[1].url, "/a");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body, json!({"query": "query", "key": "secret"}));
    }

    #[tokio::test]
    async fn test_search_without_opinion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": null})))
            .mount(&server)
            .await;

        let result = provider(&server.uri())
            .search("query", CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_search_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .search("query", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_search_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .search("query", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_search_cancelled_while_waiting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"matches": []}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = provider(&server.uri())
            .search("query", cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_ask_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            ": stream opened\n",
            "data: {\"type\":\"progress\",\"content\":\"He\"}\n\n",
            "data: {\"type\":\"progress\",\"content\":\"llo\"}\n\n",
            "data: {\"type\":\"references\",\"items\":[{\"url\":\"/r1\",\"title\":\"R1\"}]}"
        );
        Mock::given(method("POST"))
            .and(path("/api/v1/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        provider(&server.uri())
            .ask(42, "hello?", tx, CancellationToken::new())
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(delta) = rx.recv().await {
            received.push(delta);
        }
        assert_eq!(
            received,
            vec![
                AskDelta::progress("He"),
                AskDelta::progress("llo"),
                AskDelta::references(vec![Reference::new("/r1", "R1")]),
            ]
        );

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["id"], 42);
        assert_eq!(sent["query"], "hello?");
    }

    fn http_chunk(data: &str) -> Vec<u8> {
        format!("{:x}\r\n{}\r\n", data.len(), data).into_bytes()
    }

    #[tokio::test]
    async fn test_ask_cancelled_mid_stream() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // Sends one delta, then stalls long past the test's deadline
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 8192];
            let _ = socket.read(&mut request).await;

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            socket
                .write_all(&http_chunk("data: {\"type\":\"progress\",\"content\":\"He\"}\n\n"))
                .await
                .unwrap();
            socket.flush().await.unwrap();

            tokio::time::sleep(Duration::from_secs(30)).await;
            let _ = socket
                .write_all(&http_chunk("data: {\"type\":\"progress\",\"content\":\"llo\"}\n\n"))
                .await;
        });

        let provider = provider(&format!("http://{}", addr));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let ask = {
            let cancel = cancel.clone();
            tokio::spawn(async move { provider.ask(1, "q", tx, cancel).await })
        };

        assert_eq!(rx.recv().await, Some(AskDelta::progress("He")));
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), ask)
            .await
            .expect("ask kept running after cancellation")
            .unwrap();
        assert!(matches!(outcome, Err(ProviderError::Cancelled)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_ask_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, _rx) = mpsc::channel(1);
        let err = provider("http://127.0.0.1:9")
            .ask(1, "q", tx, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
