//! Response parsers.
//!
//! A parser declares the MIME types it accepts and turns a complete body into
//! a typed value. The session checks the status code first, then asks the
//! parser whether the content type is acceptable, and only then buffers the
//! body and calls [`ResponseParser::parse`].

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use turbo_xml::XmlElement;

use super::mime::mime_essence;
use crate::data::ResponseMeta;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("response has no Content-Type")]
    MissingContentType,

    #[error("malformed Content-Type {0:?}")]
    MalformedContentType(String),

    #[error("content type {found} is not one of {accepted:?}")]
    UnacceptableContentType { found: String, accepted: Vec<String> },

    #[error("empty response body")]
    EmptyBody,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Xml(#[from] turbo_xml::Error),
}

impl ParseError {
    /// `true` for errors raised by [`ResponseParser::should_parse`].
    pub fn is_content_type(&self) -> bool {
        matches!(
            self,
            ParseError::MissingContentType | ParseError::MalformedContentType(_) | ParseError::UnacceptableContentType { .. }
        )
    }
}

/// Turns a response body into a value.
///
/// Parsers are shared by reference between concurrent operations and hold no
/// per-response state.
pub trait ResponseParser: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Lowercased MIME essences this parser accepts. Empty means any.
    fn accepted_mime_types(&self) -> &BTreeSet<String>;

    /// Check the response's content type before the body is read.
    fn should_parse(&self, response: &ResponseMeta) -> Result<(), ParseError> {
        let accepted = self.accepted_mime_types();
        if accepted.is_empty() {
            return Ok(());
        }
        let raw = response.content_type().ok_or(ParseError::MissingContentType)?;
        let essence = mime_essence(raw).ok_or_else(|| ParseError::MalformedContentType(raw.to_string()))?;
        if accepted.contains(&essence) {
            Ok(())
        } else {
            Err(ParseError::UnacceptableContentType {
                found:    essence,
                accepted: accepted.iter().cloned().collect(),
            })
        }
    }

    fn parse(&self, body: &[u8], response: &ResponseMeta) -> Result<Self::Output, ParseError>;
}

/// Passes the body through untouched and accepts any content type.
#[derive(Debug, Clone, Default)]
pub struct RawParser {
    accepted: BTreeSet<String>,
}

impl RawParser {
    pub fn new() -> Self { Self::default() }
}

impl ResponseParser for RawParser {
    type Output = Bytes;

    fn accepted_mime_types(&self) -> &BTreeSet<String> { &self.accepted }

    fn parse(&self, body: &[u8], _response: &ResponseMeta) -> Result<Bytes, ParseError> {
        Ok(Bytes::copy_from_slice(body))
    }
}

fn mime_set<const N: usize>(types: [&str; N]) -> BTreeSet<String> {
    types.into_iter().map(str::to_string).collect()
}

/// Deserializes JSON bodies into `T`, [`serde_json::Value`] by default.
pub struct JsonParser<T = serde_json::Value> {
    accepted: BTreeSet<String>,
    _output:  PhantomData<fn() -> T>,
}

impl<T> JsonParser<T> {
    pub fn new() -> Self {
        Self {
            accepted: mime_set(["application/json", "text/json", "text/javascript"]),
            _output:  PhantomData,
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime: &str) -> Self {
        self.accepted.insert(mime.to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn without_mime_type(mut self, mime: &str) -> Self {
        self.accepted.remove(&mime.to_ascii_lowercase());
        self
    }
}

impl<T> Default for JsonParser<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for JsonParser<T> {
    fn clone(&self) -> Self {
        Self {
            accepted: self.accepted.clone(),
            _output:  PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonParser").field("accepted", &self.accepted).finish()
    }
}

impl<T> ResponseParser for JsonParser<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn accepted_mime_types(&self) -> &BTreeSet<String> { &self.accepted }

    fn parse(&self, body: &[u8], _response: &ResponseMeta) -> Result<T, ParseError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::EmptyBody);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

/// Parses XML bodies into an [`XmlElement`] tree.
#[derive(Debug, Clone)]
pub struct XmlParser {
    accepted: BTreeSet<String>,
}

impl XmlParser {
    pub fn new() -> Self {
        Self {
            accepted: mime_set(["application/xml", "text/xml"]),
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime: &str) -> Self {
        self.accepted.insert(mime.to_ascii_lowercase());
        self
    }
}

impl Default for XmlParser {
    fn default() -> Self { Self::new() }
}

impl ResponseParser for XmlParser {
    type Output = XmlElement;

    fn accepted_mime_types(&self) -> &BTreeSet<String> { &self.accepted }

    fn parse(&self, body: &[u8], _response: &ResponseMeta) -> Result<XmlElement, ParseError> {
        Ok(XmlElement::parse(body)?)
    }
}
