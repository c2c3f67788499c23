//! HTTP transport abstraction for testability.
//!
//! The sync engine only needs a single GET with an optional `If-None-Match`
//! header. [`Transport`] captures that so tests can inject canned responses.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tracing::{debug, trace};

use super::checksum;
use super::error::{SyncError, SyncResult};

/// Boxed future used by dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// HTTP status for "not modified".
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// A GET request, optionally conditional on a previously seen cache tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute URL.
    pub url: String,
    /// Tag sent as `If-None-Match`.
    pub conditional_tag: Option<String>,
    /// Per-request timeout. `None` uses the transport default.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create an unconditional GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conditional_tag: None,
            timeout: None,
        }
    }

    /// Make the request conditional on `tag`. Empty tags are ignored.
    pub fn with_conditional_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.conditional_tag = if tag.is_empty() { None } else { Some(tag) };
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether an `If-None-Match` header will be sent.
    pub fn is_conditional(&self) -> bool {
        self.conditional_tag.is_some()
    }
}

/// A received response with its body fully materialized.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// `ETag` header, if the server sent one.
    pub cache_tag: Option<String>,
    /// Response body.
    pub body: Bytes,
    /// Time from send to body received.
    pub elapsed: Duration,
}

impl Response {
    /// Whether the server reported the resource unchanged.
    pub fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// SHA-1 digest of the body.
    pub fn content_hash(&self) -> String {
        checksum::content_hash(&self.body)
    }

    /// Body length in bytes.
    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Trait for sending sync requests.
///
/// Implementations return any status the server answers with; interpreting
/// the status is up to the caller. Errors are reserved for requests that
/// never produced a response.
pub trait Transport: Send + Sync {
    /// Send a request and read the full body.
    fn send<'a>(&'a self, request: Request) -> BoxFuture<'a, SyncResult<Response>>;
}

/// Real transport using an async reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the given default timeout.
    pub fn new(default_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("modsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_timeout,
        })
    }

    async fn execute(&self, request: Request) -> SyncResult<Response> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let url = request.url.clone();
        let start = Instant::now();

        let mut builder = self.client.get(&url).timeout(timeout);
        if let Some(tag) = &request.conditional_tag {
            builder = builder.header(IF_NONE_MATCH, tag.as_str());
        }

        debug!(url = %url, conditional = request.is_conditional(), "Sending request");

        let fetch = async {
            let response = builder.send().await.map_err(|e| map_reqwest_error(&url, timeout, e))?;

            let status = response.status().as_u16();
            let cache_tag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .filter(|t| !t.is_empty());

            let body = response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(&url, timeout, e))?;

            Ok::<_, SyncError>((status, cache_tag, body))
        };

        let (status, cache_tag, body) = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| SyncError::Timeout {
                url: url.clone(),
                timeout_secs: timeout.as_secs(),
            })??;

        let elapsed = start.elapsed();
        trace!(
            url = %url,
            status,
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Response received"
        );

        Ok(Response {
            status,
            cache_tag,
            body,
            elapsed,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: Request) -> BoxFuture<'a, SyncResult<Response>> {
        Box::pin(self.execute(request))
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        SyncError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Mock transport serving canned responses by URL.
    ///
    /// Records every request it sees. A conditional request whose tag
    /// equals the stored tag for that URL answers 304.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<String, MockResponse>>,
        pub requests: Mutex<Vec<Request>>,
    }

    #[derive(Clone)]
    pub enum MockResponse {
        Ok { body: Bytes, tag: Option<String> },
        Status(u16),
        Error(String),
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, body: impl Into<Bytes>, tag: Option<&str>) {
            self.responses.lock().insert(
                url.to_string(),
                MockResponse::Ok {
                    body: body.into(),
                    tag: tag.map(str::to_string),
                },
            );
        }

        pub fn fail(&self, url: &str, response: MockResponse) {
            self.responses.lock().insert(url.to_string(), response);
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl Transport for MockTransport {
        fn send<'a>(&'a self, request: Request) -> BoxFuture<'a, SyncResult<Response>> {
            self.requests.lock().push(request.clone());
            let canned = self.responses.lock().get(&request.url).cloned();

            Box::pin(async move {
                match canned {
                    Some(MockResponse::Ok { body, tag }) => {
                        if request.conditional_tag.is_some() && request.conditional_tag == tag {
                            return Ok(Response {
                                status: STATUS_NOT_MODIFIED,
                                cache_tag: tag,
                                body: Bytes::new(),
                                elapsed: Duration::ZERO,
                            });
                        }
                        Ok(Response {
                            status: 200,
                            cache_tag: tag,
                            body,
                            elapsed: Duration::ZERO,
                        })
                    }
                    Some(MockResponse::Status(status)) => Ok(Response {
                        status,
                        cache_tag: None,
                        body: Bytes::new(),
                        elapsed: Duration::ZERO,
                    }),
                    Some(MockResponse::Error(reason)) => Err(SyncError::Transport {
                        url: request.url,
                        reason,
                    }),
                    None => Ok(Response {
                        status: 404,
                        cache_tag: None,
                        body: Bytes::new(),
                        elapsed: Duration::ZERO,
                    }),
                }
            })
        }
    }

    #[test]
    fn test_request_builder() {
        let request = Request::get("http://example.com/mods.json")
            .with_conditional_tag("v1")
            .with_timeout(Duration::from_secs(5));

        assert!(request.is_conditional());
        assert_eq!(request.conditional_tag.as_deref(), Some("v1"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_conditional_tag_is_ignored() {
        let request = Request::get("http://example.com").with_conditional_tag("");
        assert!(!request.is_conditional());
    }

    #[test]
    fn test_response_status_helpers() {
        let response = Response {
            status: 304,
            cache_tag: Some("v1".to_string()),
            body: Bytes::new(),
            elapsed: Duration::ZERO,
        };
        assert!(response.is_not_modified());
        assert!(!response.is_success());

        let response = Response {
            status: 200,
            cache_tag: None,
            body: Bytes::from_static(b"hello world"),
            elapsed: Duration::ZERO,
        };
        assert!(response.is_success());
        assert_eq!(response.len(), 11);
        assert_eq!(
            response.content_hash(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[tokio::test]
    async fn test_mock_transport_conditional() {
        let mock = MockTransport::new();
        mock.serve("http://x/mods.json", &b"[]"[..], Some("v1"));

        let fresh = mock
            .send(Request::get("http://x/mods.json"))
            .await
            .unwrap();
        assert_eq!(fresh.status, 200);

        let cached = mock
            .send(Request::get("http://x/mods.json").with_conditional_tag("v1"))
            .await
            .unwrap();
        assert!(cached.is_not_modified());
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_error() {
        let mock = MockTransport::new();
        mock.fail("http://x/a", MockResponse::Error("refused".to_string()));

        let result = mock.send(Request::get("http://x/a")).await;
        assert!(matches!(result, Err(SyncError::Transport { .. })));
    }
}
