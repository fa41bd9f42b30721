//! The session: entry point for every request and download.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures_util::{FutureExt, StreamExt};
use http::Method;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};
use turbo_xml::XmlElement;

use super::auth::{self, SessionChallengeHandler, TaskChallengeHandler};
use super::delegate::BackgroundDelegate;
use super::download;
use super::operation::{Operation, OperationShared, Registry, TaskContext, TaskId, lock, read, write};
use super::traffic;
use super::transport::Transport;
use crate::core::{JsonParser, RequestBuilder, ResponseParser, UrlEncodedBuilder, XmlParser};
use crate::data::{
    AcceptedStatusCodes, Download, HttpRequest, Parameters, ProgressCallback, Reply, ResumeData, ResumeToken,
    SessionConfig, TransferState,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Resetting,
    Invalidated,
}

struct SessionState<T> {
    phase:     Phase,
    transport: Arc<T>,
    root:      CancellationToken,
}

struct SessionInner<T: Transport> {
    config:          Arc<SessionConfig>,
    state:           Mutex<SessionState<T>>,
    registry:        Registry,
    next_id:         AtomicU64,
    accepted:        RwLock<Arc<AcceptedStatusCodes>>,
    session_handler: RwLock<Option<SessionChallengeHandler>>,
    task_handler:    RwLock<Option<TaskChallengeHandler>>,
    delegate:        RwLock<Option<Weak<dyn BackgroundDelegate<T>>>>,
}

/// Issues requests and downloads over one pooled transport.
///
/// Cloning is cheap and every clone drives the same session. Entry points
/// either fail immediately, without touching the network, or return an
/// [`Operation`] that resolves exactly once. They must be called from within
/// a tokio runtime.
///
/// ```no_run
/// use serde_json::{Value, json};
/// use turbo_http::{HttpSession, Reply, SessionConfig};
///
/// # async fn run() -> turbo_http::Result<()> {
/// let session = HttpSession::new(SessionConfig::default())?;
/// let params = json!({ "query": "matrix" }).as_object().cloned().unwrap_or_default();
/// let reply: Reply<Value> = session.get_json("https://api.example.com/movies", Some(&params))?.await?;
/// println!("{}", reply.data["results"]);
/// # Ok(())
/// # }
/// ```
pub struct HttpSession<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: Transport> Clone for HttpSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for HttpSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = lock(&self.inner.state).phase;
        f.debug_struct("HttpSession")
            .field("phase", &phase)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest")]
impl HttpSession<super::transport::ReqwestTransport> {
    /// Session over a reqwest client built from `config`.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let transport = super::transport::ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }
}

/// Lets the generic launcher report finished downloads to the delegate.
pub(crate) trait Outcome {
    fn download_location(&self) -> Option<&Path> { None }
}

impl<D> Outcome for Reply<D> {}

impl Outcome for Download {
    fn download_location(&self) -> Option<&Path> { Some(&self.location) }
}

impl<T: Transport> HttpSession<T> {
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        let accepted = Arc::new(config.accepted_status_codes.clone());
        Self {
            inner: Arc::new(SessionInner {
                config: Arc::new(config),
                state: Mutex::new(SessionState {
                    phase:     Phase::Active,
                    transport: Arc::new(transport),
                    root:      CancellationToken::new(),
                }),
                registry: Registry::default(),
                next_id: AtomicU64::new(0),
                accepted: RwLock::new(accepted),
                session_handler: RwLock::new(None),
                task_handler: RwLock::new(None),
                delegate: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig { &self.inner.config }

    /// Send `request` as-is and decode the response with `parser`.
    ///
    /// The status is checked against the accepted codes before the parser is
    /// consulted; the body is only read once the parser accepts the content
    /// type.
    pub fn start_request<P: ResponseParser>(&self, request: HttpRequest, parser: P) -> Result<Operation<Reply<P::Output>>> {
        let ctx = self.begin()?;
        let op = ctx.op.clone();
        Ok(self.launch(op, async move { fetch(&ctx, request, parser).await }))
    }

    /// Merge `parameters` into `request` with `builder`, then proceed as
    /// [`start_request`](Self::start_request). A builder error is returned
    /// before any operation exists.
    pub fn start_request_with<B, P>(
        &self,
        request: &HttpRequest,
        parameters: &Parameters,
        builder: &B,
        parser: P,
    ) -> Result<Operation<Reply<P::Output>>>
    where
        B: RequestBuilder + ?Sized,
        P: ResponseParser,
    {
        self.ensure_active()?;
        let request = builder.build(request, parameters)?;
        self.start_request(request, parser)
    }

    pub fn get<B, P>(
        &self,
        url: &str,
        parameters: Option<&Parameters>,
        builder: &B,
        parser: P,
    ) -> Result<Operation<Reply<P::Output>>>
    where
        B: RequestBuilder + ?Sized,
        P: ResponseParser,
    {
        self.send_method(Method::GET, url, parameters, builder, parser)
    }

    pub fn post<B, P>(
        &self,
        url: &str,
        parameters: Option<&Parameters>,
        builder: &B,
        parser: P,
    ) -> Result<Operation<Reply<P::Output>>>
    where
        B: RequestBuilder + ?Sized,
        P: ResponseParser,
    {
        self.send_method(Method::POST, url, parameters, builder, parser)
    }

    /// `GET` with query parameters, decoding a JSON body into `D`.
    pub fn get_json<D>(&self, url: &str, parameters: Option<&Parameters>) -> Result<Operation<Reply<D>>>
    where
        D: DeserializeOwned + Send + 'static,
    {
        self.get(url, parameters, &UrlEncodedBuilder::new(), JsonParser::<D>::new())
    }

    /// `GET` with query parameters, parsing an XML body.
    pub fn get_xml(&self, url: &str, parameters: Option<&Parameters>) -> Result<Operation<Reply<XmlElement>>> {
        self.get(url, parameters, &UrlEncodedBuilder::new(), XmlParser::new())
    }

    fn send_method<B, P>(
        &self,
        method: Method,
        url: &str,
        parameters: Option<&Parameters>,
        builder: &B,
        parser: P,
    ) -> Result<Operation<Reply<P::Output>>>
    where
        B: RequestBuilder + ?Sized,
        P: ResponseParser,
    {
        let request = HttpRequest::parse(method, url)?;
        match parameters {
            Some(parameters) => self.start_request_with(&request, parameters, builder, parser),
            None => self.start_request(request, parser),
        }
    }

    /// Stream the response body of `request` to a file in the download
    /// directory.
    ///
    /// `progress` runs once per received chunk, always before the operation
    /// resolves and never after it is cancelled.
    pub fn download_request(&self, request: HttpRequest, progress: Option<ProgressCallback>) -> Result<Operation<Download>> {
        let ctx = self.begin()?;
        let op = ctx.op.clone();
        Ok(self.launch(op, async move { download::download(&ctx, request, progress).await }))
    }

    /// Continue a download from the token attached to its failure.
    ///
    /// A token that cannot be decoded fails immediately with
    /// [`Error::ResumeInvalidated`]. If the server no longer serves the same
    /// content the operation fails with that error too, and the partial file
    /// is left where it is.
    pub fn resume_download_with_data(
        &self,
        token: &ResumeToken,
        progress: Option<ProgressCallback>,
    ) -> Result<Operation<Download>> {
        self.ensure_active()?;
        let data = ResumeData::decode(token).map_err(Error::ResumeInvalidated)?;
        let ctx = self.begin()?;
        let op = ctx.op.clone();
        Ok(self.launch(op, async move { download::resume(&ctx, data, progress).await }))
    }

    /// Replace the accepted status codes. Operations already submitted keep
    /// the set they started with.
    pub fn set_accepted_status_codes(&self, codes: AcceptedStatusCodes) {
        *write(&self.inner.accepted) = Arc::new(codes);
    }

    pub fn accepted_status_codes(&self) -> AcceptedStatusCodes { read(&self.inner.accepted).as_ref().clone() }

    /// Install the session-wide challenge handler, replacing any previous one.
    pub fn on_session_authentication_challenge<F>(&self, handler: F)
    where
        F: Fn(auth::AuthChallenge, auth::ChallengeResponder) + Send + Sync + 'static,
    {
        *write(&self.inner.session_handler) = Some(Arc::new(handler));
    }

    /// Install the per-task challenge handler, replacing any previous one. It
    /// is asked before the session-wide handler.
    pub fn on_session_task_authentication_challenge<F>(&self, handler: F)
    where
        F: Fn(TaskId, auth::AuthChallenge, auth::ChallengeResponder) + Send + Sync + 'static,
    {
        *write(&self.inner.task_handler) = Some(Arc::new(handler));
    }

    pub fn clear_session_authentication_challenge(&self) { *write(&self.inner.session_handler) = None; }

    pub fn clear_session_task_authentication_challenge(&self) { *write(&self.inner.task_handler) = None; }

    /// Register `delegate` without taking ownership of it.
    pub fn set_background_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: BackgroundDelegate<T> + 'static,
    {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn BackgroundDelegate<T>> = weak;
        *write(&self.inner.delegate) = Some(weak);
    }

    pub fn clear_background_delegate(&self) { *write(&self.inner.delegate) = None; }

    fn delegate(&self) -> Option<Arc<dyn BackgroundDelegate<T>>> {
        read(&self.inner.delegate).as_ref().and_then(Weak::upgrade)
    }

    /// Number of operations submitted and not yet finished.
    pub fn in_flight(&self) -> usize { self.inner.registry.len() }

    pub fn is_invalidated(&self) -> bool { lock(&self.inner.state).phase == Phase::Invalidated }

    /// Cancel every outstanding operation, wait for each to resolve, and start
    /// over with an empty connection pool.
    ///
    /// Requests submitted while the reset runs fail with
    /// [`Error::SessionResetting`]. The reset runs to completion on the
    /// runtime even if the returned future is dropped.
    pub async fn reset(&self) -> Result<()> {
        let transport = {
            let mut state = lock(&self.inner.state);
            match state.phase {
                Phase::Invalidated => return Err(Error::SessionInvalidated),
                Phase::Resetting => return Err(Error::SessionResetting),
                Phase::Active => {}
            }
            state.phase = Phase::Resetting;
            state.root.cancel();
            state.transport.clone()
        };
        debug!(in_flight = self.in_flight(), "resetting session");

        let session = self.clone();
        let handle = tokio::spawn(async move { session.complete_reset(transport).await });
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::cancelled()),
        }
    }

    async fn complete_reset(&self, transport: Arc<T>) -> Result<()> {
        self.inner.registry.wait_idle().await;
        let fresh = panic::catch_unwind(AssertUnwindSafe(|| transport.reconnect()));

        let mut state = lock(&self.inner.state);
        if state.phase == Phase::Invalidated {
            return Err(Error::SessionInvalidated);
        }
        state.root = CancellationToken::new();
        state.phase = Phase::Active;
        match fresh {
            Ok(Ok(transport)) => {
                state.transport = Arc::new(transport);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "reconnect failed, keeping previous transport");
                Err(Error::transport(e))
            }
            Err(payload) => {
                drop(state);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Cancel every outstanding operation and make the session permanently
    /// unusable. Calling it again has no further effect.
    pub fn invalidate_and_cancel(&self) {
        let mut state = lock(&self.inner.state);
        if state.phase == Phase::Invalidated {
            return;
        }
        state.phase = Phase::Invalidated;
        state.root.cancel();
        drop(state);
        debug!(in_flight = self.in_flight(), "session invalidated");
    }

    fn ensure_active(&self) -> Result<()> {
        match lock(&self.inner.state).phase {
            Phase::Active => Ok(()),
            Phase::Resetting => Err(Error::SessionResetting),
            Phase::Invalidated => Err(Error::SessionInvalidated),
        }
    }

    /// Register a new operation and snapshot the policy it runs under.
    fn begin(&self) -> Result<TaskContext<T>> {
        let state = lock(&self.inner.state);
        match state.phase {
            Phase::Active => {}
            Phase::Resetting => return Err(Error::SessionResetting),
            Phase::Invalidated => return Err(Error::SessionInvalidated),
        }

        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let op = Arc::new(OperationShared::new(id, state.root.child_token()));
        self.inner.registry.insert(op.clone());

        Ok(TaskContext {
            transport: state.transport.clone(),
            accepted: read(&self.inner.accepted).clone(),
            session_handler: read(&self.inner.session_handler).clone(),
            task_handler: read(&self.inner.task_handler).clone(),
            config: self.inner.config.clone(),
            op,
        })
    }

    fn launch<R, F>(&self, op: Arc<OperationShared>, work: F) -> Operation<R>
    where
        R: Outcome + Any + Send,
        F: std::future::Future<Output = Result<R>> + Send + 'static,
    {
        let session = self.clone();
        let shared = op.clone();
        let span = debug_span!("transfer", task = %op.id);
        let handle = tokio::spawn(
            async move {
                shared.set_state(TransferState::InFlight);
                debug!("dispatched");
                let result = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(Error::Panicked(panic_message(payload.as_ref()))),
                };
                shared.set_state(match &result {
                    Ok(_) => TransferState::Completed,
                    Err(e) if e.is_cancelled() => TransferState::Cancelled,
                    Err(_) => TransferState::Failed,
                });
                session.finish(shared.id, &result);
                result
            }
            .instrument(span),
        );
        Operation::new(op, handle)
    }

    fn finish<R: Outcome + Any>(&self, id: TaskId, result: &Result<R>) {
        match result {
            Ok(_) => debug!("completed"),
            Err(e) if e.is_cancelled() => debug!("cancelled"),
            Err(e) => warn!(error = %e, "failed"),
        }

        if let Some(delegate) = self.delegate() {
            let notified = panic::catch_unwind(AssertUnwindSafe(|| {
                if let Some(location) = result.as_ref().ok().and_then(Outcome::download_location) {
                    delegate.on_download_finished(self, id, location);
                }
                delegate.on_task_completed(self, id, result.as_ref().map(|value| value as &dyn Any));
            }));
            if notified.is_err() {
                warn!("background delegate panicked in completion callback");
            }
        }

        if self.inner.registry.remove(id) {
            if let Some(delegate) = self.delegate() {
                let notified = panic::catch_unwind(AssertUnwindSafe(|| delegate.on_background_events_finished(self)));
                if notified.is_err() {
                    warn!("background delegate panicked after the session drained");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "operation panicked".to_string()
    }
}

/// Request/response exchange for non-download operations.
async fn fetch<T, P>(ctx: &TaskContext<T>, request: HttpRequest, parser: P) -> Result<Reply<P::Output>>
where
    T: Transport,
    P: ResponseParser,
{
    let response = auth::send_with_challenges(ctx, request).await?;
    let meta = response.meta;
    let mut body = response.body;

    if !ctx.accepted.contains(meta.status.as_u16()) {
        return Err(Error::UnacceptableStatus {
            status:   meta.status,
            response: Box::new(meta),
        });
    }
    if let Err(source) = parser.should_parse(&meta) {
        return Err(Error::UnacceptableContentType {
            content_type: meta.content_type().map(str::to_string),
            source,
            response: Box::new(meta),
        });
    }

    let mut payload = Vec::with_capacity(meta.content_length.unwrap_or(0).min(1 << 20) as usize);
    while let Some(chunk) = ctx.guard(body.next()).await? {
        payload.extend_from_slice(&chunk.map_err(Error::transport)?);
    }
    traffic::log_response_body(ctx.config.log_traffic, &payload);

    match parser.parse(&payload, &meta) {
        Ok(data) => Ok(Reply { data, response: meta }),
        Err(source) => Err(Error::Decode {
            source,
            response: Box::new(meta),
        }),
    }
}
