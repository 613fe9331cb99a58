use crate::config::SessionConfig;
use crate::connector::{Connector, HttpConnector, RequestOptions};
use crate::error::{AppError, ErrorContext, Result, log_error};
use crate::events::{FailureKind, ReadyState, TransportEvent};
use crate::lang::TextManager;
use crate::models::{
    ChatCompletionRequest, ChatMessage, ChatMessageParams, CompletionPayload, DeltaPayload,
};
use crate::parser::{DEFAULT_EVENT_TYPE, EventFrame};
use crate::transport::{StreamTransport, TransportEvents};
use crate::types::{Language, Timestamp};
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Public Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted { request_id: String },
    Rejected(RejectReason),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A reply is still streaming.
    Busy,
    /// No messages, or a message with blank content.
    EmptyPrompt,
}

/// What a single transport event did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(ReadyState),
    Opened,
    Delta { content: String, role: String },
    /// Frame that could not be applied; the stream continues.
    Skipped,
    /// `[DONE]` received; the transport is being closed.
    Done,
    Failed {
        kind: FailureKind,
        status: Option<u16>,
        body: String,
    },
    Aborted,
    Finalized(ChatMessage),
    /// Event arrived with no reply in flight.
    Ignored,
}

/// Snapshot handed to renderers through [`ChatStreamSession::subscribe`].
///
/// The committed transcript is shared, so publishing a delta only copies the
/// pending reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub transcript: Arc<Vec<ChatMessage>>,
    pub pending: Option<ChatMessage>,
    pub is_loading: bool,
}

impl SessionView {
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript
            .iter()
            .chain(self.pending.as_ref())
            .cloned()
            .collect()
    }
}

struct InFlight {
    placeholder: ChatMessage,
    started_at: Timestamp,
    transport: StreamTransport,
    events: TransportEvents,
    cancel: CancellationToken,
    done: bool,
}

// ============================================================================
// Chat Stream Session
// ============================================================================

/// Conversation state for one chat window.
///
/// Owns the committed transcript plus at most one in-flight reply. The reply
/// is an empty loading placeholder held outside the transcript; streamed
/// deltas are folded into it, and it is stamped and committed once its
/// transport reaches `CLOSED`.
pub struct ChatStreamSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    text: TextManager,
    transcript: Arc<Vec<ChatMessage>>,
    in_flight: Option<InFlight>,
    last_error: Option<AppError>,
    view: watch::Sender<SessionView>,
}

impl ChatStreamSession {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let text = TextManager::new(config.language)?;
        let (view, _) = watch::channel(SessionView::default());
        log::debug!("Session created: {:?}", config);

        Ok(Self {
            config,
            connector,
            text,
            transcript: Arc::default(),
            in_flight: None,
            last_error: None,
            view,
        })
    }

    /// Session backed by a real HTTP client.
    pub fn with_http(config: SessionConfig) -> Result<Self> {
        let connector = HttpConnector::new().context("Building HTTP client")?;
        Self::new(config, Arc::new(connector))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn language(&self) -> Language {
        self.text.language()
    }

    pub fn set_language(&mut self, language: Language) {
        self.config.language = language;
        self.text.set_language(language);
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    /// Committed transcript followed by the in-flight placeholder, if any.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.view().messages()
    }

    /// Only messages that are complete.
    pub fn transcript(&self) -> &[ChatMessage] {
        self.transcript.as_slice()
    }

    pub fn pending_reply(&self) -> Option<&ChatMessage> {
        self.in_flight.as_ref().map(|f| &f.placeholder)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// State of the in-flight transport; `None` while idle.
    pub fn ready_state(&self) -> Option<ReadyState> {
        self.in_flight.as_ref().map(|f| f.transport.ready_state())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.transport.request_id())
    }

    /// Token that aborts the in-flight reply when cancelled from anywhere.
    pub fn cancel_handle(&self) -> Option<CancellationToken> {
        self.in_flight.as_ref().map(|f| f.cancel.clone())
    }

    /// Failure of the most recent request, cleared by the next accepted submit.
    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            transcript: Arc::clone(&self.transcript),
            pending: self.pending_reply().cloned(),
            is_loading: self.is_loading(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn check_submission(&self, new_messages: &[ChatMessageParams]) -> Option<Submission> {
        if self.in_flight.is_some() {
            log::warn!("Prompt rejected: a reply is still streaming");
            return Some(Submission::Rejected(RejectReason::Busy));
        }
        if new_messages.is_empty() || new_messages.iter().any(ChatMessageParams::is_blank) {
            log::warn!("Prompt rejected: empty message");
            return Some(Submission::Rejected(RejectReason::EmptyPrompt));
        }
        None
    }

    fn request_options(&self, request: &ChatCompletionRequest) -> Result<RequestOptions> {
        let body = serde_json::to_string(request)?;
        Ok(RequestOptions::json_post(&self.config.api_key, body)
            .with_credentials(self.config.with_credentials))
    }

    /// Append `new_messages` and start streaming a reply to the whole history.
    ///
    /// Returns `Rejected` without touching state while a reply is in flight
    /// or when the prompt is empty.
    pub fn submit_prompt(&mut self, new_messages: Vec<ChatMessageParams>) -> Result<Submission> {
        if let Some(rejected) = self.check_submission(&new_messages) {
            return Ok(rejected);
        }

        let started_at = Timestamp::now();
        let new_messages: Vec<ChatMessage> = new_messages
            .into_iter()
            .map(|m| m.into_message(started_at))
            .collect();

        let request = ChatCompletionRequest::streaming(
            &self.config.model,
            self.transcript.iter().chain(new_messages.iter()),
        );
        let options = self.request_options(&request)?;

        let mut transport =
            StreamTransport::new(self.connector.clone(), &self.config.endpoint, options)
                .with_idle_timeout(self.config.idle_timeout);
        let cancel = CancellationToken::new();
        let events = transport.open(cancel.clone())?;
        let request_id = transport.request_id().to_string();

        log::info!(
            "[{}] prompt submitted ({} messages in history)",
            request_id,
            request.messages.len()
        );

        Arc::make_mut(&mut self.transcript).extend(new_messages);
        self.in_flight = Some(InFlight {
            placeholder: ChatMessage::placeholder(started_at),
            started_at,
            transport,
            events,
            cancel,
            done: false,
        });
        self.last_error = None;
        self.publish();

        Ok(Submission::Accepted { request_id })
    }

    /// Append `new_messages` and wait for one non-streaming reply.
    ///
    /// Follows the same rejection rules as [`submit_prompt`](Self::submit_prompt).
    /// Subscribers see `is_loading` while the request runs. A failed request
    /// keeps the new messages, records [`last_error`](Self::last_error) and
    /// returns the error. Dropping the future abandons the request.
    pub async fn submit_completion(
        &mut self,
        new_messages: Vec<ChatMessageParams>,
    ) -> Result<Submission> {
        if let Some(rejected) = self.check_submission(&new_messages) {
            return Ok(rejected);
        }

        let started_at = Timestamp::now();
        let new_messages: Vec<ChatMessage> = new_messages
            .into_iter()
            .map(|m| m.into_message(started_at))
            .collect();

        let request = ChatCompletionRequest::buffered(
            &self.config.model,
            self.transcript.iter().chain(new_messages.iter()),
        );
        let options = self.request_options(&request)?;
        let request_id = Uuid::now_v7().to_string();
        log::info!(
            "[{}] completion requested ({} messages in history)",
            request_id,
            request.messages.len()
        );

        Arc::make_mut(&mut self.transcript).extend(new_messages);
        self.last_error = None;
        self.view.send_replace(SessionView {
            transcript: Arc::clone(&self.transcript),
            pending: None,
            is_loading: true,
        });

        let outcome = self.fetch_completion(&options).await;
        let result = match outcome {
            Ok(message) => {
                let finished_at = Timestamp::now().max(started_at);
                let mut reply = ChatMessage::new(message.role, message.content, finished_at);
                reply.meta.response_time = self
                    .text
                    .response_time(finished_at.seconds_since(started_at));
                log::info!(
                    "[{}] completion committed in {}",
                    request_id,
                    reply.meta.response_time
                );
                Arc::make_mut(&mut self.transcript).push(reply);
                Ok(Submission::Accepted { request_id })
            }
            Err(error) => {
                log_error(&error);
                self.last_error = Some(error.clone());
                Err(error)
            }
        };
        self.publish();
        result
    }

    async fn fetch_completion(
        &self,
        options: &RequestOptions,
    ) -> Result<crate::models::RequestMessage> {
        let value = self
            .connector
            .fetch_json(&self.config.endpoint, options)
            .await?;
        let payload: CompletionPayload = serde_json::from_value(value)
            .map_err(|e| AppError::malformed_frame(format!("Invalid completion: {}", e)))?;
        payload
            .first_message()
            .cloned()
            .ok_or_else(|| AppError::malformed_frame("Completion has no choices"))
    }

    /// Close the in-flight stream and keep whatever has arrived so far.
    ///
    /// Reports like any other cancellation: `Abort`, then `CLOSED`, with
    /// [`last_error`](Self::last_error) set to `CANCELLED`. Frames already
    /// delivered by the transport are folded in before the reply is
    /// finalized. Returns the committed reply, or `None` when idle.
    pub fn close_stream(&mut self) -> Option<ChatMessage> {
        let in_flight = self.in_flight.as_mut()?;
        log::info!("[{}] closing stream", in_flight.transport.request_id());
        in_flight.transport.close();

        while let Some(in_flight) = self.in_flight.as_mut() {
            let Ok(event) = in_flight.events.try_recv() else {
                break;
            };
            if let SessionUpdate::Finalized(message) = self.apply_event(event) {
                return Some(message);
            }
        }
        self.finalize()
    }

    /// Drop the transcript. A reply in flight is cancelled and discarded.
    pub fn reset_messages(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            log::info!(
                "[{}] reset: discarding in-flight reply",
                in_flight.transport.request_id()
            );
            in_flight.transport.close();
        }
        self.transcript = Arc::default();
        self.last_error = None;
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Event Processing
    // ------------------------------------------------------------------------

    /// Wait for the next transport event and apply it. `None` while idle.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let in_flight = self.in_flight.as_mut()?;
        let event = in_flight.events.recv().await;
        match event {
            Some(event) => Some(self.apply_event(event)),
            // Sender dropped without a CLOSED we saw; treat as closed.
            None => self.finalize().map(SessionUpdate::Finalized),
        }
    }

    /// Drive the in-flight reply to completion and return it.
    pub async fn wait_idle(&mut self) -> Option<ChatMessage> {
        let mut finalized = None;
        while let Some(update) = self.next_update().await {
            if let SessionUpdate::Finalized(message) = update {
                finalized = Some(message);
            }
        }
        finalized
    }

    /// Every update until the in-flight reply is committed.
    pub fn updates(&mut self) -> impl Stream<Item = SessionUpdate> + '_ {
        async_stream::stream! {
            while let Some(update) = self.next_update().await {
                yield update;
            }
        }
    }

    pub fn apply_event(&mut self, event: TransportEvent) -> SessionUpdate {
        let Some(done) = self.in_flight.as_ref().map(|f| f.done) else {
            log::debug!("Dropping event with nothing in flight: {:?}", event);
            return SessionUpdate::Ignored;
        };

        match event {
            TransportEvent::Open => SessionUpdate::Opened,
            TransportEvent::Message { frame } => self.apply_frame(frame),
            TransportEvent::ReadyStateChange { ready_state } if ready_state.is_closed() => self
                .finalize()
                .map(SessionUpdate::Finalized)
                .unwrap_or(SessionUpdate::Ignored),
            TransportEvent::ReadyStateChange { ready_state } => {
                SessionUpdate::StateChanged(ready_state)
            }
            TransportEvent::Error { kind, status, body } => {
                let error = match (kind, status) {
                    (_, Some(status)) => AppError::http_status(status, body.clone()),
                    (FailureKind::Timeout, None) => AppError::timeout(body.clone()),
                    _ => AppError::transport(body.clone()),
                };
                log_error(&error);
                self.last_error = Some(error);
                SessionUpdate::Failed { kind, status, body }
            }
            // Closing after [DONE] is a normal end, not a cancellation.
            TransportEvent::Abort if done => SessionUpdate::Ignored,
            TransportEvent::Abort => {
                self.last_error = Some(AppError::cancelled());
                SessionUpdate::Aborted
            }
        }
    }

    fn apply_frame(&mut self, frame: EventFrame) -> SessionUpdate {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return SessionUpdate::Ignored;
        };
        let request_id = in_flight.transport.request_id();

        if in_flight.done {
            log::debug!("[{}] frame after [DONE] dropped", request_id);
            return SessionUpdate::Ignored;
        }
        if frame.event_type != DEFAULT_EVENT_TYPE {
            log::debug!("[{}] unhandled event type: {}", request_id, frame.event_type);
            return SessionUpdate::Ignored;
        }
        if frame.is_done() {
            log::debug!("[{}] [DONE] received", request_id);
            in_flight.done = true;
            in_flight.transport.close();
            return SessionUpdate::Done;
        }

        let payload: DeltaPayload = match serde_json::from_str(&frame.data) {
            Ok(payload) => payload,
            Err(e) => {
                let error = AppError::malformed_frame(e.to_string());
                log::warn!("[{}] skipping frame: {}", request_id, error);
                return SessionUpdate::Skipped;
            }
        };
        let Some((content, role)) = payload.increment() else {
            log::warn!("[{}] skipping frame without choices", request_id);
            return SessionUpdate::Skipped;
        };

        in_flight
            .placeholder
            .push_delta(content, role, Timestamp::now());
        let update = SessionUpdate::Delta {
            content: content.to_string(),
            role: role.to_string(),
        };
        self.publish();
        update
    }

    fn finalize(&mut self) -> Option<ChatMessage> {
        let InFlight {
            mut placeholder,
            started_at,
            transport,
            ..
        } = self.in_flight.take()?;
        transport.close();

        let finished_at = Timestamp::now().max(started_at);
        placeholder.timestamp = finished_at;
        placeholder.meta.loading = false;
        placeholder.meta.response_time = self
            .text
            .response_time(finished_at.seconds_since(started_at));

        log::info!(
            "[{}] reply committed in {} ({} chunks)",
            transport.request_id(),
            placeholder.meta.response_time,
            placeholder.token_count()
        );

        Arc::make_mut(&mut self.transcript).push(placeholder.clone());
        self.publish();
        Some(placeholder)
    }
}

// ============================================================================
// Tests
// ============================================================================
