//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use tokio::sync::Semaphore;
use turbo_http::{
    BackgroundDelegate, Error, HttpRequest, HttpSession, Reply, ResponseMeta, SessionConfig, TaskId, Transport,
    TransportError, TransportErrorKind, TransportResponse,
};

pub enum Chunk {
    Data(Bytes),
    Fail(TransportErrorKind),
    /// Never yields again.
    Stall,
}

/// What the scripted server answers to one request.
pub struct MockResponse {
    status:  u16,
    headers: Vec<(String, String)>,
    chunks:  Vec<Chunk>,
    hang:    bool,
    fail:    Option<TransportErrorKind>,
    gate:    Option<Arc<Semaphore>>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            hang: false,
            fail: None,
            gate: None,
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .body(body.as_bytes())
    }

    /// The request never gets a response.
    pub fn hang() -> Self {
        let mut response = Self::new(200);
        response.hang = true;
        response
    }

    /// The request fails before a response head arrives.
    pub fn fail(kind: TransportErrorKind) -> Self {
        let mut response = Self::new(200);
        response.fail = Some(kind);
        response
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Complete body with a matching `content-length`.
    pub fn body(self, body: &[u8]) -> Self {
        let len = body.len();
        self.header("content-length", len.to_string()).chunk(body)
    }

    pub fn chunk(mut self, data: &[u8]) -> Self {
        self.chunks.push(Chunk::Data(Bytes::copy_from_slice(data)));
        self
    }

    pub fn then_fail(mut self, kind: TransportErrorKind) -> Self {
        self.chunks.push(Chunk::Fail(kind));
        self
    }

    pub fn then_stall(mut self) -> Self {
        self.chunks.push(Chunk::Stall);
        self
    }

    /// Hold the response head until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

type Responder = dyn Fn(&HttpRequest) -> MockResponse + Send + Sync;

struct Script {
    respond:    Box<Responder>,
    requests:   Mutex<Vec<HttpRequest>>,
    reconnects: AtomicUsize,
}

/// Transport that answers from a closure and records every request.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new(respond: impl Fn(&HttpRequest) -> MockResponse + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(Script {
                respond:    Box::new(respond),
                requests:   Mutex::new(Vec::new()),
                reconnects: AtomicUsize::new(0),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> { self.script.requests.lock().unwrap().clone() }

    pub fn reconnects(&self) -> usize { self.script.reconnects.load(Ordering::SeqCst) }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        self.script.requests.lock().unwrap().push(request.clone());
        let plan = (self.script.respond)(&request);

        if let Some(gate) = &plan.gate {
            gate.acquire().await.unwrap().forget();
        }
        if plan.hang {
            futures_util::future::pending::<()>().await;
        }
        if let Some(kind) = plan.fail {
            return Err(TransportError::new(kind, "scripted failure"));
        }

        let mut meta = ResponseMeta::new(StatusCode::from_u16(plan.status).unwrap(), request.url.clone());
        for (name, value) in &plan.headers {
            meta.headers.append(
                HeaderName::try_from(name.as_str()).unwrap(),
                HeaderValue::try_from(value.as_str()).unwrap(),
            );
        }
        meta.content_length = meta.header("content-length").and_then(|v| v.parse().ok());

        let body = stream::unfold(plan.chunks.into_iter(), |mut chunks| async move {
            match chunks.next()? {
                Chunk::Data(data) => Some((Ok(data), chunks)),
                Chunk::Fail(kind) => Some((Err(TransportError::new(kind, "scripted body failure")), chunks)),
                Chunk::Stall => {
                    futures_util::future::pending::<()>().await;
                    None
                }
            }
        });
        Ok(TransportResponse::new(meta, body))
    }

    fn reconnect(&self) -> Result<Self, TransportError> {
        self.script.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(self.clone())
    }
}

pub fn session_with(
    respond: impl Fn(&HttpRequest) -> MockResponse + Send + Sync + 'static,
) -> (HttpSession<ScriptedTransport>, ScriptedTransport, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new(respond);
    let config = SessionConfig::default().download_dir(dir.path().join("downloads"));
    (HttpSession::with_transport(transport.clone(), config), transport, dir)
}

/// Delegate that records every notification.
#[derive(Default)]
pub struct RecordingDelegate {
    pub completed: Mutex<Vec<(TaskId, bool)>>,
    /// JSON replies delivered with a completion.
    pub decoded:   Mutex<Vec<(TaskId, serde_json::Value)>>,
    pub downloads: Mutex<Vec<TaskId>>,
    pub drained:   AtomicUsize,
}

impl RecordingDelegate {
    pub fn completed(&self) -> Vec<(TaskId, bool)> { self.completed.lock().unwrap().clone() }

    pub fn drained(&self) -> usize { self.drained.load(Ordering::SeqCst) }
}

impl<T: Transport> BackgroundDelegate<T> for RecordingDelegate {
    fn on_background_events_finished(&self, _session: &HttpSession<T>) { self.drained.fetch_add(1, Ordering::SeqCst); }

    fn on_task_completed(&self, _session: &HttpSession<T>, task: TaskId, outcome: Result<&dyn Any, &Error>) {
        if let Some(reply) = outcome.ok().and_then(|value| value.downcast_ref::<Reply<serde_json::Value>>()) {
            self.decoded.lock().unwrap().push((task, reply.data.clone()));
        }
        self.completed.lock().unwrap().push((task, outcome.is_ok()));
    }

    fn on_download_finished(&self, _session: &HttpSession<T>, task: TaskId, location: &std::path::Path) {
        assert!(location.exists());
        self.downloads.lock().unwrap().push(task);
    }
}

pub fn payload(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }
