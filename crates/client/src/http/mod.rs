//! HTTP remote tier.
//!
//! ### Behavior
//!
//! - **Request**: `GET <endpoint>?bbox=minLon,minLat,maxLon,maxLat&<filters>`, JSON body.
//! - **Rate Limiting**: a minimum interval between calls, since the upstream APIs are metered.
//! - **Timeouts**: the tier budget is applied per request; the orchestrator enforces it too.
//! - **Status mapping**: 5xx is a transient server error, 429 is rate-limited, any other
//!   non-success is a plain HTTP error.

pub mod endpoint;

pub use endpoint::{UrlError, canonicalize, request_url};

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hazardmap_core::geo::BoundingBox;
use hazardmap_core::resolve::{QueryFilters, RemoteDataClient, RemoteError};
use reqwest::{StatusCode, header};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "hazardmap/0.1";

/// Default minimum interval between requests.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Errors building an HTTP tier.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] UrlError),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// HTTP tier configuration.
#[derive(Debug, Clone)]
pub struct HttpTierConfig {
    /// Short tier name for logs.
    pub name: String,
    pub endpoint: String,
    pub user_agent: String,
    pub min_request_interval: Duration,
}

impl HttpTierConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_request_interval: MIN_REQUEST_INTERVAL,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }
}

/// Rate limiter to enforce request intervals.
#[derive(Debug)]
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self { last_request: Mutex::new(None), min_interval }
    }

    /// Acquire permission to make a request, waiting if necessary.
    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Map a non-success status onto a tier error.
pub fn status_error(status: StatusCode) -> Option<RemoteError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(RemoteError::RateLimited)
    } else if status.is_server_error() {
        Some(RemoteError::Server { status: status.as_u16() })
    } else {
        Some(RemoteError::Http { status: status.as_u16() })
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() { RemoteError::Timeout } else { RemoteError::Transport(err.to_string()) }
}

/// A remote tier answering bounding-box queries with a JSON body of type `T`.
pub struct HttpTierClient<T> {
    http: reqwest::Client,
    name: String,
    endpoint: url::Url,
    rate_limiter: Arc<RateLimiter>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for HttpTierClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTierClient").field("name", &self.name).field("endpoint", &self.endpoint.as_str()).finish()
    }
}

impl<T> HttpTierClient<T> {
    pub fn new(config: HttpTierConfig) -> Result<Self, ClientError> {
        let endpoint = canonicalize(&config.endpoint)?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            http,
            name: config.name,
            endpoint,
            rate_limiter: Arc::new(RateLimiter::new(config.min_request_interval)),
            _payload: PhantomData,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl<T> RemoteDataClient<T> for HttpTierClient<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch(&self, bounds: &BoundingBox, filters: &QueryFilters, timeout: Duration) -> Result<T, RemoteError> {
        self.rate_limiter.acquire().await;

        let start = Instant::now();
        let url = request_url(&self.endpoint, bounds, filters);

        tracing::debug!(tier = %self.name, url = %url, "requesting remote tier");

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if let Some(err) = status_error(status) {
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let payload = serde_json::from_slice(&bytes).map_err(|e| RemoteError::Parse(e.to_string()))?;

        tracing::debug!(
            tier = %self.name,
            status = status.as_u16(),
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "remote tier responded"
        );

        Ok(payload)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazards::HotspotSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response, returning the request line it saw.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}/hotspots"), handle)
    }

    fn client(endpoint: &str) -> HttpTierClient<HotspotSet> {
        HttpTierClient::new(HttpTierConfig::new("primary", endpoint).with_min_request_interval(Duration::ZERO)).unwrap()
    }

    fn uk() -> BoundingBox {
        BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::OK).is_none());
        assert_eq!(status_error(StatusCode::TOO_MANY_REQUESTS), Some(RemoteError::RateLimited));
        assert_eq!(status_error(StatusCode::BAD_GATEWAY), Some(RemoteError::Server { status: 502 }));
        assert_eq!(status_error(StatusCode::NOT_FOUND), Some(RemoteError::Http { status: 404 }));
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE).unwrap().is_transient());
        assert!(!status_error(StatusCode::FORBIDDEN).unwrap().is_transient());
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        let result = HttpTierClient::<HotspotSet>::new(HttpTierConfig::new("primary", "ftp://example.org"));
        assert!(matches!(result, Err(ClientError::InvalidEndpoint(UrlError::UnsupportedScheme(_)))));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let body = r#"{"hotspots":[{"id":"h1","lat":51.5,"lon":-0.12,"intensity":9.5,"detectedAt":"2024-05-01T13:45:00Z"}]}"#;
        let (endpoint, server) = serve_once("200 OK", body).await;

        let mut filters = QueryFilters::new();
        filters.insert("days".into(), "1".into());
        let set = client(&endpoint).fetch(&uk(), &filters, Duration::from_secs(5)).await.unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.hotspots[0].id, "h1");
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /hotspots?bbox=-12%2C49%2C3%2C62&days=1 "), "{request_line}");
    }

    #[tokio::test]
    async fn test_fetch_maps_server_error() {
        let (endpoint, _server) = serve_once("503 Service Unavailable", "{}").await;
        let err = client(&endpoint).fetch(&uk(), &QueryFilters::new(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, RemoteError::Server { status: 503 });
    }

    #[tokio::test]
    async fn test_fetch_maps_parse_error() {
        let (endpoint, _server) = serve_once("200 OK", "<html>maintenance</html>").await;
        let err = client(&endpoint).fetch(&uk(), &QueryFilters::new(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RemoteError::Parse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
