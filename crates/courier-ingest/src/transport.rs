//! HTTP transport and retry policy
//!
//! A [`Transport`] performs exactly one GET attempt. Retrying and error
//! translation live one layer up in [`crate::client::RemoteClient`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use url::Url;

use crate::error::TransportError;

/// Default number of attempts per logical request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait before the second attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Each further wait is this many times the previous one.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// One request/response exchange returning a JSON body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: Url) -> Result<Value, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
///
/// Authentication headers are attached to every request; the timeout
/// applies to each attempt separately.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(headers: HeaderMap, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(classify)?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else if err.is_connect()
        || err.is_request()
        || err.is_body()
        || is_dropped_connection(&err)
    {
        // Sending failed or the peer went away mid-exchange: reset, closed
        // before a response, or a truncated body.
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

fn is_dropped_connection(err: &(dyn StdError + 'static)) -> bool {
    let mut current = err.source();
    while let Some(cause) = current {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = cause.source();
    }
    false
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: Url) -> Result<Value, TransportError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.map_err(classify)?;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// How many times to try a request and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting; keeps tests fast
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: Duration::ZERO,
            backoff_factor: 1,
        }
    }

    /// Wait after the given failed attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .saturating_pow(attempt.saturating_sub(1));
        self.interval.saturating_mul(factor)
    }

    /// At least one attempt is always made
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn delay_grows_by_backoff_factor() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
        assert_eq!(RetryPolicy::immediate(0).delay(4), Duration::ZERO);
    }

    #[tokio::test]
    async fn error_status_keeps_body_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/file/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(HeaderMap::new(), Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/api/v2/file/", server.uri())).unwrap();
        let err = transport.get(url).await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), Some("Unauthorized"));
        assert_eq!(err.cause_name(), "UnauthorizedError");
    }

    #[tokio::test]
    async fn default_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(header("X-Pharos-API-User", "youruser"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-pharos-api-user", "youruser".parse().unwrap());
        let transport = ReqwestTransport::new(headers, Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/items", server.uri())).unwrap();

        assert_eq!(transport.get(url).await.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(HeaderMap::new(), Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = transport.get(url).await.unwrap_err();

        assert_eq!(err.cause_name(), "ParsingError");
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport =
            ReqwestTransport::new(HeaderMap::new(), Duration::from_millis(50)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = transport.get(url).await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout(_)), "got: {err:?}");
    }

    /// Counts attempts passed through to the real transport
    struct Counting {
        inner: ReqwestTransport,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Counting {
        async fn get(&self, url: Url) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(url).await
        }
    }

    #[tokio::test]
    async fn dropped_connection_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let transport = Arc::new(Counting {
            inner: ReqwestTransport::new(HeaderMap::new(), Duration::from_secs(5)).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let base_url = Url::parse(&format!("http://{addr}/api/v2/")).unwrap();
        let client = RemoteClient::new(
            "Archivematica",
            base_url,
            transport.clone(),
            RetryPolicy::immediate(3),
        );

        let err = client.fetch_one("file/").await.unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.cause, "ConnectionFailed");
        assert_eq!(err.status, None);
    }
}
