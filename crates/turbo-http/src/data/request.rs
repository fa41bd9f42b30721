use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use url::Url;

use crate::error::{Error, Result};

/// Request parameters as a JSON object.
///
/// Builders flatten nested objects and arrays into `key[sub]` / `key[]` pairs
/// when encoding into a query string, and serialize the object as-is for JSON
/// bodies.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// A request template handed to the session.
///
/// Builders never modify a template in place; they return a new request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,

    /// Total timeout for this request, overriding the session default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Parse `url` and create a request for it.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|source| Error::InvalidUrl { url: url.to_string(), source })?;
        Ok(Self::new(method, parsed))
    }

    pub fn get(url: &str) -> Result<Self> { Self::parse(Method::GET, url) }

    pub fn post(url: &str) -> Result<Self> { Self::parse(Method::POST, url) }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `true` when parameters for this method belong in the URL query rather
    /// than the body.
    pub fn encodes_parameters_in_query(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD || self.method == Method::DELETE
    }
}

/// Status line and headers of a received response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    pub status: StatusCode,

    /// Final URL after redirects.
    pub url: Url,
    pub headers: HeaderMap,

    /// Body length announced by the server, if any.
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            content_length: None,
        }
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Raw `Content-Type` header, parameters included.
    pub fn content_type(&self) -> Option<&str> { self.header(header::CONTENT_TYPE) }

    pub fn etag(&self) -> Option<&str> { self.header(header::ETAG) }

    pub fn last_modified(&self) -> Option<&str> { self.header(header::LAST_MODIFIED) }

    pub fn accepts_byte_ranges(&self) -> bool {
        self.header(header::ACCEPT_RANGES)
            .is_some_and(|value| value.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
    }
}

/// A decoded response.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub data: T,
    pub response: ResponseMeta,
}

/// A finished download. The file at `location` belongs to the caller.
#[derive(Debug, Clone)]
pub struct Download {
    pub location: PathBuf,
    pub response: ResponseMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_bad_url() {
        let err = HttpRequest::get("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_parameter_placement_by_method() {
        assert!(HttpRequest::get("http://h/").unwrap().encodes_parameters_in_query());
        assert!(HttpRequest::parse(Method::DELETE, "http://h/").unwrap().encodes_parameters_in_query());
        assert!(HttpRequest::parse(Method::HEAD, "http://h/").unwrap().encodes_parameters_in_query());
        assert!(!HttpRequest::post("http://h/").unwrap().encodes_parameters_in_query());
        assert!(!HttpRequest::parse(Method::PUT, "http://h/").unwrap().encodes_parameters_in_query());
    }

    #[test]
    fn test_response_meta_headers() {
        let mut meta = ResponseMeta::new(StatusCode::OK, Url::parse("http://h/file").unwrap());
        meta.headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none, Bytes"));
        meta.headers.insert(header::ETAG, HeaderValue::from_static("\"v1\""));

        assert!(meta.accepts_byte_ranges());
        assert_eq!(meta.etag(), Some("\"v1\""));
        assert_eq!(meta.last_modified(), None);
        assert_eq!(meta.content_type(), None);
    }
}
