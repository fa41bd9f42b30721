use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::{HttpRequest, ResponseMeta};

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The connection dropped while the body was being received.
    Interrupted,
    /// The request could not be sent.
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::Interrupted => "connection interrupted",
            TransportErrorKind::Request => "request failed",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(label)
    }
}

/// Network-level failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind:    TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool { self.kind == TransportErrorKind::Timeout }
}

/// Response head plus a body that is read lazily.
pub struct TransportResponse {
    pub meta: ResponseMeta,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl TransportResponse {
    pub fn new(meta: ResponseMeta, body: impl Stream<Item = Result<Bytes, TransportError>> + Send + 'static) -> Self {
        Self {
            meta,
            body: Box::pin(body),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse").field("meta", &self.meta).finish_non_exhaustive()
    }
}

/// Asynchronous HTTP transport owned by a session.
///
/// Implementations own the connection pool, follow redirects, and apply
/// timeouts. Status codes are never treated as errors at this level.
///
/// # Implementations
///
/// - [`ReqwestTransport`]: production implementation using `reqwest`
/// - Scripted transports in tests
pub trait Transport: Send + Sync + Sized + 'static {
    /// Send `request` and return once the response head has arrived.
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;

    /// An equivalent transport with an empty connection pool.
    fn reconnect(&self) -> Result<Self, TransportError>;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::StreamExt;
    use http::header::{HeaderMap, HeaderName, HeaderValue};

    use super::*;
    use crate::data::SessionConfig;
    use crate::error::{Error, Result};

    /// Production transport built on a pooled `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        config: SessionConfig,
    }

    impl ReqwestTransport {
        pub fn new(config: &SessionConfig) -> Result<Self> {
            let client = build_client(config)?;
            Ok(Self {
                client,
                config: config.clone(),
            })
        }
    }

    fn build_client(config: &SessionConfig) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::Config(format!("invalid default header name {name:?}: {e}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::Config(format!("invalid value for default header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
    }

    impl From<reqwest::Error> for TransportError {
        fn from(err: reqwest::Error) -> Self {
            let kind = if err.is_timeout() {
                TransportErrorKind::Timeout
            } else if err.is_connect() {
                TransportErrorKind::Connect
            } else if err.is_body() || err.is_decode() {
                TransportErrorKind::Interrupted
            } else if err.is_request() || err.is_builder() || err.is_redirect() {
                TransportErrorKind::Request
            } else {
                TransportErrorKind::Other
            };
            TransportError::new(kind, err.to_string())
        }
    }

    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> std::result::Result<TransportResponse, TransportError> {
            let mut builder = self.client.request(request.method, request.url).headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await?;
            let mut meta = ResponseMeta::new(response.status(), response.url().clone());
            meta.headers = response.headers().clone();
            meta.content_length = response.content_length();

            let body = response.bytes_stream().map(|chunk| chunk.map_err(TransportError::from));
            Ok(TransportResponse::new(meta, body))
        }

        fn reconnect(&self) -> std::result::Result<Self, TransportError> {
            let client =
                build_client(&self.config).map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;
            Ok(Self {
                client,
                config: self.config.clone(),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestTransport;
