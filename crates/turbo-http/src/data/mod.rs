//! Immutable data types shared by the session, builders and parsers.
//!
//! Nothing in this module performs I/O. Requests, response metadata,
//! configuration, progress counters and resume tokens are plain values that
//! are cloned or moved between layers rather than mutated in place.

pub mod options;
pub mod progress;
pub mod request;
pub mod resume;
pub mod status;

pub use options::SessionConfig;
pub use progress::{Progress, ProgressCallback, TransferState};
pub use request::{Download, HttpRequest, Parameters, Reply, ResponseMeta};
pub(crate) use resume::ResumeData;
pub use resume::ResumeToken;
pub use status::{AcceptedStatusCodes, StatusRangeError};
