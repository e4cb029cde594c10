//! Remote image fetching with bounded connect and read timeouts.

use axum::body::Bytes;
use reqwest::{Client, Response, StatusCode, header::CONTENT_TYPE};
use std::time::Duration;

/// Default ceiling for establishing the upstream connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default ceiling for each read from the upstream connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeouts applied to every outbound fetch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FetchConfig {
    /// Limit on establishing the TCP (and TLS) connection.
    pub connect_timeout: Duration,
    /// Limit on each individual read, headers and body alike.
    pub read_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Network-level failure while talking to the upstream server.
///
/// A non-2xx answer is not a `FetchError`; it is reported through
/// [`FetchResult::status`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("{0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e)
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Upstream answer with its headers read and its body still on the wire.
pub struct FetchResult {
    status: StatusCode,
    content_type: Option<String>,
    response: Response,
}

impl FetchResult {
    /// Status line of the upstream answer, whatever it was.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The raw `content-type` header, if the upstream sent one.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Reads the whole body. Each read is still bounded by the read timeout.
    pub async fn body(self) -> Result<Bytes, FetchError> {
        Ok(self.response.bytes().await?)
    }
}

/// HTTP client for pulling images from caller-supplied URLs.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    /// Issues a GET for `url`. No retries are attempted.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        log::debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

        Ok(FetchResult {
            status,
            content_type,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = FetchConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_transport_error() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch("not a url").await.err().unwrap();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_a_timeout() {
        // 10.255.255.1 is non-routable, so the connect is never answered
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let started = std::time::Instant::now();
        let err = fetcher.fetch("http://10.255.255.1/img.jpg").await.err().unwrap();

        match err {
            FetchError::Timeout(_) => {
                assert!(started.elapsed() < Duration::from_secs(2));
                assert!(err.to_string().starts_with("request timed out"));
            }
            // hosts with no route at all fail fast instead of hanging
            FetchError::Transport(ref e) if e.is_connect() => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        // bind then drop so the port is very likely closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let result = fetcher.fetch(&format!("http://127.0.0.1:{port}/img.jpg")).await;
        assert!(result.is_err());
    }
}
