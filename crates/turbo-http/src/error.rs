//! Error types for turbo-http.

use std::io;

use http::StatusCode;

use crate::core::{BuildError, ParseError};
use crate::data::{ResponseMeta, ResumeToken};
use crate::effects::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url:    String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to encode request parameters: {0}")]
    Encoding(#[from] BuildError),

    #[error("transport failure: {source}")]
    Transport {
        #[source]
        source: TransportError,
        resume: Option<ResumeToken>,
    },

    #[error("unacceptable status code {status}")]
    UnacceptableStatus {
        status:   StatusCode,
        response: Box<ResponseMeta>,
    },

    #[error("unacceptable content type {content_type:?}: {source}")]
    UnacceptableContentType {
        content_type: Option<String>,
        #[source]
        source:       ParseError,
        response:     Box<ResponseMeta>,
    },

    #[error("failed to decode response body: {source}")]
    Decode {
        #[source]
        source:   ParseError,
        response: Box<ResponseMeta>,
    },

    #[error("resume data is no longer valid: {0}")]
    ResumeInvalidated(String),

    #[error("session has been invalidated")]
    SessionInvalidated,

    #[error("session is resetting")]
    SessionResetting,

    #[error("operation cancelled")]
    Cancelled { resume: Option<ResumeToken> },

    #[error("download file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// User code run by the operation (a progress callback, a challenge
    /// handler) panicked.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub(crate) fn cancelled() -> Self { Error::Cancelled { resume: None } }

    pub(crate) fn transport(source: TransportError) -> Self { Error::Transport { source, resume: None } }

    /// Resume token attached to an interrupted download, if the server allowed
    /// partial content.
    pub fn resume_token(&self) -> Option<&ResumeToken> {
        match self {
            Error::Transport { resume, .. } | Error::Cancelled { resume } => resume.as_ref(),
            _ => None,
        }
    }

    /// Response metadata for failures that happened after a response arrived.
    pub fn response(&self) -> Option<&ResponseMeta> {
        match self {
            Error::UnacceptableStatus { response, .. }
            | Error::UnacceptableContentType { response, .. }
            | Error::Decode { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool { matches!(self, Error::Cancelled { .. }) }

    pub fn status(&self) -> Option<StatusCode> { self.response().map(|response| response.status) }
}

pub type Result<T> = std::result::Result<T, Error>;
