//! HTTP session with pluggable request builders, response parsers and
//! resumable downloads.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable requests, responses, configuration and resume tokens
//! - [`core`] - Pure transformations: parameter encoding, builders, parsers
//! - [`effects`] - I/O: transport, session, operations, downloads
//!
//! # Key Features
//!
//! - **Exactly-once completion**: every [`Operation`] resolves once, on one
//!   branch, including under cancellation, reset and invalidation
//! - **Snapshotted policy**: accepted status codes and challenge handlers are
//!   fixed for an operation when it is submitted
//! - **Resumable downloads**: interrupted downloads carry a [`ResumeToken`]
//!   that continues from the bytes already on disk
//! - **No retries**: transport failures surface as-is; retry policy belongs to
//!   the caller

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use crate::core::{
    BuildError, BuilderConfig, JsonBuilder, JsonParser, ParseError, RawParser, RequestBuilder, ResponseParser,
    StringEncoding, UrlEncodedBuilder, XmlParser,
};
pub use data::{
    AcceptedStatusCodes, Download, HttpRequest, Parameters, Progress, ProgressCallback, Reply, ResponseMeta, ResumeToken,
    SessionConfig, TransferState,
};
pub use effects::{
    AuthChallenge, BackgroundDelegate, ChallengeDisposition, ChallengeResponder, ChallengeScope, Credential, HttpSession,
    Operation, TaskId, Transport, TransportError, TransportErrorKind, TransportResponse,
};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestTransport;

pub use error::{Error, Result};
pub use turbo_xml::XmlElement;
