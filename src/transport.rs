use crate::connector::{ByteStream, ConnectResponse, Connector, RequestOptions, TransportError};
use crate::events::{ReadyState, TransportEvent};
use crate::parser::EventFrameParser;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// Emitter
// ============================================================================

struct Inner {
    ready_state: ReadyState,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl Inner {
    fn send(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is listening any more.
            let _ = events.send(event);
        }
    }

    fn transition(&mut self, next: ReadyState) -> bool {
        if !self.ready_state.can_transition_to(next) {
            return false;
        }
        self.ready_state = next;
        self.send(TransportEvent::ReadyStateChange { ready_state: next });
        if next.is_closed() {
            self.events = None;
        }
        true
    }
}

#[derive(Clone)]
struct Emitter {
    request_id: Arc<str>,
    inner: Arc<Mutex<Inner>>,
}

impl Emitter {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: Arc::from(request_id),
            inner: Arc::new(Mutex::new(Inner {
                ready_state: ReadyState::Initializing,
                events: None,
            })),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.lock().ready_state
    }

    fn attach(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        self.inner.lock().events = Some(events);
    }

    fn transition(&self, next: ReadyState) -> bool {
        let changed = self.inner.lock().transition(next);
        if changed {
            log::debug!("[{}] ready state -> {}", self.request_id, next);
        }
        changed
    }

    fn emit(&self, event: TransportEvent) -> bool {
        let inner = self.inner.lock();
        if inner.ready_state.is_closed() {
            return false;
        }
        inner.send(event);
        true
    }

    fn open(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.ready_state != ReadyState::Connecting {
            return false;
        }
        inner.send(TransportEvent::Open);
        inner.transition(ReadyState::Open)
    }

    fn close(&self) -> bool {
        self.transition(ReadyState::Closed)
    }

    fn fail(&self, err: TransportError) {
        let mut inner = self.inner.lock();
        if inner.ready_state.is_closed() {
            return;
        }
        let kind = err.kind();
        let (status, body) = match err {
            TransportError::Status { status, body } => (Some(status), body),
            other => (None, other.to_string()),
        };
        log::error!(
            "[{}] stream failed ({}, status {:?}): {}",
            self.request_id,
            kind,
            status,
            body
        );
        inner.send(TransportEvent::Error { kind, status, body });
        inner.transition(ReadyState::Closed);
    }

    fn abort(&self) {
        let mut inner = self.inner.lock();
        if inner.ready_state.is_closed() {
            return;
        }
        log::info!("[{}] stream aborted", self.request_id);
        inner.send(TransportEvent::Abort);
        inner.transition(ReadyState::Closed);
    }
}

// ============================================================================
// Stream Transport
// ============================================================================

/// One streaming HTTP request and its `INITIALIZING -> CONNECTING -> OPEN -> CLOSED`
/// lifecycle.
///
/// Every event goes through a single unbounded channel. The ready state and
/// the sender live behind one lock, so nothing can follow `CLOSED`.
pub struct StreamTransport {
    request_id: String,
    url: String,
    options: RequestOptions,
    connector: Arc<dyn Connector>,
    idle_timeout: Option<Duration>,
    emitter: Emitter,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl StreamTransport {
    pub fn new(
        connector: Arc<dyn Connector>,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Self {
        let request_id = Uuid::now_v7().to_string();
        let emitter = Emitter::new(&request_id);
        Self {
            request_id,
            url: url.into(),
            options,
            connector,
            idle_timeout: None,
            emitter,
            cancel: None,
            task: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn ready_state(&self) -> ReadyState {
        self.emitter.ready_state()
    }

    /// Start the request on the current tokio runtime.
    ///
    /// `cancel` may be cancelled from anywhere; the transport then reports
    /// `Abort` followed by `CLOSED`.
    pub fn open(&mut self, cancel: CancellationToken) -> Result<TransportEvents, TransportError> {
        if self.task.is_some() || self.ready_state() != ReadyState::Initializing {
            return Err(TransportError::AlreadyOpened);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.emitter.attach(tx);
        self.emitter.transition(ReadyState::Connecting);
        log::info!(
            "[{}] {} {}",
            self.request_id,
            self.options.method.as_str(),
            self.url
        );

        let reader = Reader {
            connector: self.connector.clone(),
            url: self.url.clone(),
            options: self.options.clone(),
            idle_timeout: self.idle_timeout,
            emitter: self.emitter.clone(),
            cancel: cancel.clone(),
        };
        self.task = Some(tokio::spawn(reader.run()));
        self.cancel = Some(cancel);

        Ok(rx)
    }

    /// Idempotent. On a live request `Abort` and then `CLOSED` are sent
    /// before this returns.
    pub fn close(&self) {
        self.emitter.abort();
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Background Reader
// ============================================================================

struct Reader {
    connector: Arc<dyn Connector>,
    url: String,
    options: RequestOptions,
    idle_timeout: Option<Duration>,
    emitter: Emitter,
    cancel: CancellationToken,
}

impl Reader {
    async fn run(self) {
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.emitter.abort();
                return;
            }
            result = self.connector.connect(&self.url, &self.options) => result,
        };

        let response = match connected {
            Ok(response) => response,
            Err(err) => {
                self.emitter.fail(err);
                return;
            }
        };

        let success = response.is_success();
        let ConnectResponse { status, mut body } = response;
        if !success {
            let text = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.emitter.abort();
                    return;
                }
                text = read_to_string(&mut body) => text,
            };
            self.emitter.fail(TransportError::Status { status, body: text });
            return;
        }

        if !self.emitter.open() {
            return;
        }

        let mut decoder = Utf8Decoder::default();
        let mut parser = EventFrameParser::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.emitter.abort();
                    return;
                }
                next = next_chunk(&mut body, self.idle_timeout) => next,
            };

            match next {
                Ok(Some(bytes)) => {
                    let text = decoder.decode(&bytes);
                    for frame in parser.feed(&text) {
                        if !self.emitter.emit(TransportEvent::Message { frame }) {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    let tail = decoder.finish();
                    let frames = parser.feed(&tail).into_iter().chain(parser.flush());
                    for frame in frames {
                        if !self.emitter.emit(TransportEvent::Message { frame }) {
                            return;
                        }
                    }
                    self.emitter.close();
                    return;
                }
                Err(err) => {
                    self.emitter.fail(err);
                    return;
                }
            }
        }
    }
}

async fn next_chunk(
    body: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Bytes>, TransportError> {
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| TransportError::IdleTimeout(limit))?,
        None => body.next().await,
    };
    next.transpose()
}

async fn read_to_string(body: &mut ByteStream) -> String {
    let mut decoder = Utf8Decoder::default();
    let mut text = String::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => text.push_str(&decoder.decode(&bytes)),
            Err(err) => {
                log::warn!("Error body truncated: {}", err);
                break;
            }
        }
    }
    text.push_str(&decoder.finish());
    text
}

// ============================================================================
// UTF-8 Decoding
// ============================================================================

/// Holds back an incomplete multi-byte sequence until the next chunk.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

// ============================================================================
// Tests
// ============================================================================
