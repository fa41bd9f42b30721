//! I/O: the transport seam, the session and its operations, downloads, and
//! authentication challenge plumbing.

mod auth;
mod delegate;
mod download;
mod operation;
mod session;
mod traffic;
mod transport;

pub use auth::{
    AuthChallenge, ChallengeDisposition, ChallengeResponder, ChallengeScope, Credential, SessionChallengeHandler,
    TaskChallengeHandler,
};
pub use delegate::BackgroundDelegate;
pub use operation::{Operation, TaskId};
pub use session::HttpSession;
pub use transport::{BoxStream, Transport, TransportError, TransportErrorKind, TransportResponse};

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
