//! Authentication challenges.
//!
//! A `401` carrying `WWW-Authenticate` or a `407` carrying
//! `Proxy-Authenticate` is turned into an [`AuthChallenge`] and offered to the
//! registered handlers. The per-task handler is asked first; when it is absent
//! or asks for default handling the session handler is asked. A handler
//! answers through the [`ChallengeResponder`] it is given, immediately or
//! later from another task.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{self, HeaderName, HeaderValue};
use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use super::operation::{TaskContext, TaskId};
use super::traffic;
use super::transport::{Transport, TransportResponse};
use crate::data::{HttpRequest, ResponseMeta};
use crate::error::{Error, Result};

/// Called for challenges raised by any operation of the session.
pub type SessionChallengeHandler = Arc<dyn Fn(AuthChallenge, ChallengeResponder) + Send + Sync>;

/// Called with the identity of the operation that hit the challenge.
pub type TaskChallengeHandler = Arc<dyn Fn(TaskId, AuthChallenge, ChallengeResponder) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeScope {
    /// Origin server, `401 Unauthorized`.
    Server,
    /// Proxy, `407 Proxy Authentication Required`.
    Proxy,
}

impl ChallengeScope {
    fn challenge_header(&self) -> HeaderName {
        match self {
            ChallengeScope::Server => header::WWW_AUTHENTICATE,
            ChallengeScope::Proxy => header::PROXY_AUTHENTICATE,
        }
    }

    fn credential_header(&self) -> HeaderName {
        match self {
            ChallengeScope::Server => header::AUTHORIZATION,
            ChallengeScope::Proxy => header::PROXY_AUTHORIZATION,
        }
    }
}

/// Describes what is asking for credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scope: ChallengeScope,

    /// Authentication scheme, e.g. `Basic` or `Bearer`.
    pub scheme: String,
    pub realm: Option<String>,
    pub host: Option<String>,
    pub url: Url,

    /// Credentials already tried for this request and rejected.
    pub previous_failure_count: u32,

    /// The full challenge header value.
    pub raw: String,
}

impl AuthChallenge {
    /// Extract the challenge from a `401`/`407` response, if it carries one.
    pub fn from_response(response: &ResponseMeta, previous_failure_count: u32) -> Option<Self> {
        let scope = match response.status {
            StatusCode::UNAUTHORIZED => ChallengeScope::Server,
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => ChallengeScope::Proxy,
            _ => return None,
        };
        let raw = response.header(scope.challenge_header())?.trim();
        let scheme = raw.split_whitespace().next()?.trim_end_matches(',').to_string();

        Some(Self {
            scope,
            scheme,
            realm: auth_param(raw, "realm"),
            host: response.url.host_str().map(str::to_string),
            url: response.url.clone(),
            previous_failure_count,
            raw: raw.to_string(),
        })
    }
}

/// Value of `name=value` or `name="value"` inside a challenge.
fn auth_param(challenge: &str, name: &str) -> Option<String> {
    let (_, params) = challenge.split_once(char::is_whitespace)?;
    for param in params.split(',') {
        let Some((key, value)) = param.split_once('=') else { continue };
        if key.trim().eq_ignore_ascii_case(name) {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }
    None
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { user: String, password: String },
    Bearer(String),
}

impl Credential {
    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Basic {
            user:     user.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self { Credential::Bearer(token.into()) }

    pub fn header_value(&self) -> std::result::Result<HeaderValue, header::InvalidHeaderValue> {
        let value = match self {
            Credential::Basic { user, password } => format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))),
            Credential::Bearer(token) => format!("Bearer {token}"),
        };
        let mut value = HeaderValue::try_from(value)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish_non_exhaustive(),
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDisposition {
    /// Let the next handler decide; with none left, the challenge response is
    /// delivered as-is.
    PerformDefaultHandling,
    /// Retry the request with this credential.
    UseCredential(Credential),
    /// Fail the operation with [`Error::Cancelled`].
    CancelChallenge,
    /// Continue without credentials.
    RejectProtectionSpace,
}

/// Completion handed to a challenge handler.
///
/// `respond` consumes the responder, so a challenge is answered at most once.
/// A responder dropped without an answer counts as
/// [`ChallengeDisposition::PerformDefaultHandling`].
pub struct ChallengeResponder {
    sender: oneshot::Sender<ChallengeDisposition>,
}

impl ChallengeResponder {
    pub fn respond(self, disposition: ChallengeDisposition) { let _ = self.sender.send(disposition); }
}

impl fmt::Debug for ChallengeResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ChallengeResponder") }
}

async fn ask<T, F>(ctx: &TaskContext<T>, invoke: F) -> Result<ChallengeDisposition>
where
    T: Transport,
    F: FnOnce(ChallengeResponder),
{
    let (sender, receiver) = oneshot::channel();
    invoke(ChallengeResponder { sender });
    let answer = ctx.guard(receiver).await?;
    Ok(answer.unwrap_or(ChallengeDisposition::PerformDefaultHandling))
}

async fn resolve<T: Transport>(ctx: &TaskContext<T>, challenge: AuthChallenge) -> Result<ChallengeDisposition> {
    if let Some(handler) = &ctx.task_handler {
        let id = ctx.id();
        let challenge = challenge.clone();
        let disposition = ask(ctx, |responder| handler(id, challenge, responder)).await?;
        if disposition != ChallengeDisposition::PerformDefaultHandling {
            return Ok(disposition);
        }
    }
    if let Some(handler) = &ctx.session_handler {
        return ask(ctx, |responder| handler(challenge, responder)).await;
    }
    Ok(ChallengeDisposition::PerformDefaultHandling)
}

/// Send `request`, answering authentication challenges until the server
/// accepts, a handler gives up, or `max_auth_attempts` credentials have been
/// rejected.
pub(crate) async fn send_with_challenges<T: Transport>(
    ctx: &TaskContext<T>,
    mut request: HttpRequest,
) -> Result<TransportResponse> {
    let mut failures = 0;
    loop {
        traffic::log_request(ctx.config.log_traffic, &request);
        let response = ctx.guard(ctx.transport.send(request.clone())).await?.map_err(Error::transport)?;
        traffic::log_response(ctx.config.log_traffic, &response.meta);

        let Some(challenge) = AuthChallenge::from_response(&response.meta, failures) else {
            return Ok(response);
        };
        if failures >= ctx.config.max_auth_attempts {
            debug!(failures, "giving up on authentication challenge");
            return Ok(response);
        }

        let scope = challenge.scope;
        debug!(?scope, scheme = %challenge.scheme, "authentication challenge");
        match resolve(ctx, challenge).await? {
            ChallengeDisposition::UseCredential(credential) => {
                let value = credential
                    .header_value()
                    .map_err(|e| Error::Config(format!("credential is not a valid header value: {e}")))?;
                request.headers.insert(scope.credential_header(), value);
                failures += 1;
            }
            ChallengeDisposition::CancelChallenge => return Err(Error::cancelled()),
            ChallengeDisposition::PerformDefaultHandling | ChallengeDisposition::RejectProtectionSpace => {
                return Ok(response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_response(status: StatusCode, name: HeaderName, value: &'static str) -> ResponseMeta {
        let mut meta = ResponseMeta::new(status, Url::parse("https://api.example.com/private").unwrap());
        meta.headers.insert(name, HeaderValue::from_static(value));
        meta
    }

    #[test]
    fn test_server_challenge() {
        let meta = challenge_response(
            StatusCode::UNAUTHORIZED,
            header::WWW_AUTHENTICATE,
            "Basic realm=\"api\", charset=\"UTF-8\"",
        );
        let challenge = AuthChallenge::from_response(&meta, 0).unwrap();
        assert_eq!(challenge.scope, ChallengeScope::Server);
        assert_eq!(challenge.scheme, "Basic");
        assert_eq!(challenge.realm.as_deref(), Some("api"));
        assert_eq!(challenge.host.as_deref(), Some("api.example.com"));
        assert_eq!(challenge.previous_failure_count, 0);
    }

    #[test]
    fn test_proxy_challenge() {
        let meta = challenge_response(
            StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            header::PROXY_AUTHENTICATE,
            "Bearer",
        );
        let challenge = AuthChallenge::from_response(&meta, 2).unwrap();
        assert_eq!(challenge.scope, ChallengeScope::Proxy);
        assert_eq!(challenge.scheme, "Bearer");
        assert_eq!(challenge.realm, None);
        assert_eq!(challenge.previous_failure_count, 2);
    }

    #[test]
    fn test_no_challenge_without_header_or_status() {
        let meta = ResponseMeta::new(StatusCode::UNAUTHORIZED, Url::parse("http://h/").unwrap());
        assert!(AuthChallenge::from_response(&meta, 0).is_none());

        let meta = challenge_response(StatusCode::FORBIDDEN, header::WWW_AUTHENTICATE, "Basic");
        assert!(AuthChallenge::from_response(&meta, 0).is_none());
    }

    #[test]
    fn test_credential_header_values() {
        let basic = Credential::basic("Aladdin", "open sesame").header_value().unwrap();
        assert_eq!(basic, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(basic.is_sensitive());

        assert_eq!(Credential::bearer("t0k3n").header_value().unwrap(), "Bearer t0k3n");
        assert!(Credential::bearer("bad\ntoken").header_value().is_err());
        assert!(!format!("{:?}", Credential::basic("u", "secret")).contains("secret"));
    }

    #[tokio::test]
    async fn test_dropped_responder_means_default() {
        let (sender, receiver) = oneshot::channel::<ChallengeDisposition>();
        drop(ChallengeResponder { sender });
        assert!(receiver.await.is_err());
    }
}
