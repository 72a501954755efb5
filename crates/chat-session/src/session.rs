//! Chat session controller.
//!
//! Drives one conversation against the streaming endpoints: sends a user
//! message, folds the event stream into a running text buffer, collects
//! tool-approval requests, and reconciles with the server copy of the chat
//! whenever a stream ends.
//!
//! ```text
//! Idle --send_message-----------------> Streaming --done/error/eof/timeout--> Idle
//! Streaming --approval_required-------> Streaming (+1 pending approval)
//! Streaming --cancel------------------> Idle
//! Idle --resolve_approval(channel)----> Streaming
//! Idle --resolve_approval(no channel)-> Idle
//! ```
//!
//! At most one stream is open per session. Each stream gets a generation
//! number; a consumer that exits after `cancel` already reset the session
//! sees its generation is gone and leaves state alone, so the re-fetch
//! happens exactly once per stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ChatSessionError;
use crate::logging::{StreamLog, StreamLogger, StreamOrigin};
use crate::sse::{SseDecoder, SseFrame, StreamEvent};
use crate::traits::{ByteStream, ChatBackend, NoopObserver, SessionObserver};
use crate::types::{Chat, Message, MessageContent, PendingApproval};

/// How a stream ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server sent `done`.
    Completed,
    /// `cancel` was called.
    Cancelled,
    /// No bytes arrived within the idle timeout.
    TimedOut,
    /// The body ended without a terminal frame.
    Closed,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::Cancelled => "cancelled",
            StreamOutcome::TimedOut => "timed_out",
            StreamOutcome::Closed => "closed",
        }
    }
}

/// Result of a successful approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The server acknowledged without a follow-up stream.
    Resolved,
    /// The server resumed the worker on a channel, which was streamed.
    Streamed(StreamOutcome),
}

/// Coarse session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Streaming(StreamOrigin),
}

struct ActiveStream {
    generation: u64,
    origin: StreamOrigin,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    active: Option<ActiveStream>,
    next_generation: u64,
    streaming_content: String,
    pending_approvals: Vec<PendingApproval>,
    processing_approval: Option<String>,
    conversation: Option<Chat>,
    optimistic: Option<Message>,
    last_error: Option<String>,
}

impl SessionState {
    fn begin(&mut self, origin: StreamOrigin) -> (u64, CancellationToken) {
        self.next_generation += 1;
        let cancel = CancellationToken::new();
        self.active = Some(ActiveStream {
            generation: self.next_generation,
            origin,
            cancel: cancel.clone(),
        });
        self.streaming_content.clear();
        self.last_error = None;
        (self.next_generation, cancel)
    }

    fn owns(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    fn end(&mut self) -> Option<ActiveStream> {
        self.streaming_content.clear();
        self.active.take()
    }
}

#[derive(Default)]
struct EpisodeStats {
    fragments: usize,
    chars: usize,
    approvals: usize,
}

enum Chunk {
    Data(Result<bytes::Bytes, ChatSessionError>),
    End,
    TimedOut,
}

/// Controller for one chat conversation.
pub struct ChatSession {
    chat_id: String,
    backend: Arc<dyn ChatBackend>,
    observer: Arc<dyn SessionObserver>,
    logger: Arc<StreamLogger>,
    idle_timeout: Option<Duration>,
    state: RwLock<SessionState>,
}

impl ChatSession {
    pub fn new(chat_id: &str, backend: Arc<dyn ChatBackend>, config: &ClientConfig) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            backend,
            observer: Arc::new(NoopObserver),
            logger: Arc::new(StreamLogger::new(config.stream_log_path.clone())),
            idle_timeout: config.idle_timeout(),
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_logger(mut self, logger: Arc<StreamLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// `None` waits forever for the next chunk.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub async fn phase(&self) -> SessionPhase {
        match self.state.read().await.active {
            Some(ref a) => SessionPhase::Streaming(a.origin),
            None => SessionPhase::Idle,
        }
    }

    pub async fn is_streaming(&self) -> bool {
        self.state.read().await.active.is_some()
    }

    /// Assistant text received so far on the open stream.
    pub async fn streaming_content(&self) -> String {
        self.state.read().await.streaming_content.clone()
    }

    pub async fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.state.read().await.pending_approvals.clone()
    }

    /// Tool call id whose decision is being posted, if any.
    pub async fn processing_approval(&self) -> Option<String> {
        self.state.read().await.processing_approval.clone()
    }

    /// Last chat fetched from the server.
    pub async fn conversation(&self) -> Option<Chat> {
        self.state.read().await.conversation.clone()
    }

    /// Server messages followed by the optimistic user message, if one is
    /// still waiting for reconciliation.
    pub async fn messages(&self) -> Vec<Message> {
        let st = self.state.read().await;
        let mut messages = st
            .conversation
            .as_ref()
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        messages.extend(st.optimistic.clone());
        messages
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Fetch the authoritative chat, replacing the local copy.
    pub async fn refresh(&self) -> Result<Chat, ChatSessionError> {
        let chat = self.backend.fetch_chat(&self.chat_id).await?;
        {
            let mut st = self.state.write().await;
            st.conversation = Some(chat.clone());
            if st.active.is_none() {
                st.optimistic = None;
            }
        }
        self.observer.on_conversation(&chat);
        Ok(chat)
    }

    /// Send a user message and consume the reply stream to its end.
    ///
    /// Rejected with `StreamActive` while a stream is open and with
    /// `ApprovalInFlight` while an approval decision is being posted; a
    /// rejected call changes nothing. Otherwise the message is shown
    /// optimistically, the stream is consumed, and on every exit path the
    /// streaming state is reset and the chat re-fetched. Transport failures
    /// and server `error` frames are returned as errors after that cleanup.
    pub async fn send_message(
        &self,
        content: impl Into<MessageContent>,
    ) -> Result<StreamOutcome, ChatSessionError> {
        let content = content.into();
        let (generation, cancel) = {
            let mut st = self.state.write().await;
            if st.active.is_some() {
                return Err(ChatSessionError::StreamActive);
            }
            if let Some(ref id) = st.processing_approval {
                return Err(ChatSessionError::ApprovalInFlight(id.clone()));
            }
            st.optimistic = Some(Message::pending_user(&self.chat_id, content.clone()));
            st.begin(StreamOrigin::Send)
        };

        tracing::info!(chat_id = %self.chat_id, generation, "sending message");
        let started = Instant::now();

        match self.backend.open_message_stream(&self.chat_id, &content).await {
            Ok(stream) => {
                self.consume(generation, StreamOrigin::Send, cancel, stream, started)
                    .await
            }
            Err(e) => {
                self.finish(generation, StreamOrigin::Send, started, EpisodeStats::default(), Err(e))
                    .await
            }
        }
    }

    /// Abort the open stream.
    ///
    /// Returns `false` (and does nothing) when idle. Otherwise the read is
    /// dropped without waiting on the server, local streaming state is
    /// cleared, and the chat is re-fetched once to pick up whatever the
    /// server persisted.
    pub async fn cancel(&self) -> bool {
        let taken = self.state.write().await.end();
        let Some(active) = taken else {
            tracing::debug!(chat_id = %self.chat_id, "cancel ignored: no active stream");
            return false;
        };

        active.cancel.cancel();
        tracing::info!(
            chat_id = %self.chat_id,
            generation = active.generation,
            "stream cancelled"
        );
        self.reconcile().await;
        true
    }

    /// Post a decision for a pending approval.
    ///
    /// The id must be pending and no other decision may be in flight; a
    /// second call for an already resolved id fails with `UnknownApproval`
    /// without reaching the server. On success the approval leaves the
    /// pending set; if the server resumes the worker on a channel that
    /// stream is consumed like any other.
    pub async fn resolve_approval(
        &self,
        tool_call_id: &str,
        approved: bool,
    ) -> Result<ApprovalOutcome, ChatSessionError> {
        {
            let mut st = self.state.write().await;
            if st.active.is_some() {
                return Err(ChatSessionError::StreamActive);
            }
            if !st
                .pending_approvals
                .iter()
                .any(|a| a.tool_call_id == tool_call_id)
            {
                return Err(ChatSessionError::UnknownApproval(tool_call_id.to_string()));
            }
            if let Some(ref id) = st.processing_approval {
                return Err(ChatSessionError::ApprovalInFlight(id.clone()));
            }
            st.processing_approval = Some(tool_call_id.to_string());
        }

        tracing::info!(chat_id = %self.chat_id, tool_call_id, approved, "resolving approval");

        let response = match self
            .backend
            .resolve_approval(&self.chat_id, tool_call_id, approved)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                {
                    let mut st = self.state.write().await;
                    st.processing_approval = None;
                    st.last_error = Some(e.to_string());
                }
                tracing::error!(chat_id = %self.chat_id, tool_call_id, error = %e, "approval failed");
                self.observer.on_error(&e);
                self.reconcile().await;
                return Err(e);
            }
        };

        let begun = {
            let mut st = self.state.write().await;
            st.pending_approvals.retain(|a| a.tool_call_id != tool_call_id);
            st.processing_approval = None;
            // `processing_approval` kept sends out, so nothing is streaming.
            debug_assert!(st.active.is_none());
            response
                .channel_id
                .map(|channel| (channel, st.begin(StreamOrigin::Approval)))
        };

        let Some((channel_id, (generation, cancel))) = begun else {
            tracing::info!(chat_id = %self.chat_id, tool_call_id, "approval resolved");
            self.reconcile().await;
            return Ok(ApprovalOutcome::Resolved);
        };

        tracing::info!(
            chat_id = %self.chat_id,
            tool_call_id,
            channel_id = %channel_id,
            generation,
            "approval resumed worker, opening channel stream"
        );
        let started = Instant::now();
        let outcome = match self
            .backend
            .open_channel_stream(&self.chat_id, &channel_id)
            .await
        {
            Ok(stream) => {
                self.consume(generation, StreamOrigin::Approval, cancel, stream, started)
                    .await
            }
            Err(e) => {
                self.finish(
                    generation,
                    StreamOrigin::Approval,
                    started,
                    EpisodeStats::default(),
                    Err(e),
                )
                .await
            }
        };
        outcome.map(ApprovalOutcome::Streamed)
    }

    // ── Stream consumption ───────────────────────────────────────────────────

    async fn consume(
        &self,
        generation: u64,
        origin: StreamOrigin,
        cancel: CancellationToken,
        mut stream: ByteStream,
        started: Instant,
    ) -> Result<StreamOutcome, ChatSessionError> {
        let mut decoder = SseDecoder::new();
        let mut stats = EpisodeStats::default();

        let result = loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(StreamOutcome::Cancelled),
                chunk = next_chunk(&mut stream, self.idle_timeout) => chunk,
            };

            match chunk {
                Chunk::Data(Ok(bytes)) => {
                    let mut terminal = None;
                    for frame in decoder.push(&bytes) {
                        terminal = self.apply_frame(generation, &frame, &mut stats).await;
                        if terminal.is_some() {
                            break;
                        }
                    }
                    if let Some(result) = terminal {
                        break result;
                    }
                }
                Chunk::Data(Err(e)) => break Err(e),
                Chunk::TimedOut => {
                    tracing::warn!(
                        chat_id = %self.chat_id,
                        generation,
                        timeout_secs = self.idle_timeout.map(|d| d.as_secs()).unwrap_or(0),
                        "stream idle timeout"
                    );
                    break Ok(StreamOutcome::TimedOut);
                }
                Chunk::End => {
                    if let Some(frame) = decoder.finish() {
                        if let Some(result) = self.apply_frame(generation, &frame, &mut stats).await
                        {
                            break result;
                        }
                    }
                    tracing::warn!(chat_id = %self.chat_id, generation, "stream ended without terminal frame");
                    break Ok(StreamOutcome::Closed);
                }
            }
        };

        // Dropping the body closes the connection; later bytes are discarded.
        drop(stream);
        self.finish(generation, origin, started, stats, result).await
    }

    /// Apply one frame. Returns the stream result once a terminal frame
    /// arrives or the stream no longer owns the session.
    async fn apply_frame(
        &self,
        generation: u64,
        frame: &SseFrame,
        stats: &mut EpisodeStats,
    ) -> Option<Result<StreamOutcome, ChatSessionError>> {
        let event = match StreamEvent::from_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, event = %frame.event, error = %e, "skipping malformed frame");
                return None;
            }
        };

        match event {
            StreamEvent::Message { content, approval } => {
                // Observers run after the lock is released.
                let (appended, added) = {
                    let mut st = self.state.write().await;
                    if !st.owns(generation) {
                        return Some(Ok(StreamOutcome::Cancelled));
                    }
                    let appended = content.filter(|c| !c.is_empty()).map(|fragment| {
                        st.streaming_content.push_str(&fragment);
                        stats.fragments += 1;
                        stats.chars += fragment.chars().count();
                        (fragment, st.streaming_content.clone())
                    });
                    let added = approval.and_then(|approval| {
                        stats.approvals += 1;
                        let known = st
                            .pending_approvals
                            .iter()
                            .any(|a| a.tool_call_id == approval.tool_call_id);
                        if known {
                            return None;
                        }
                        st.pending_approvals.push(approval.clone());
                        Some(approval)
                    });
                    (appended, added)
                };

                if let Some((fragment, buffer)) = appended {
                    self.observer.on_content(&fragment, &buffer);
                }
                if let Some(approval) = added {
                    tracing::info!(
                        chat_id = %self.chat_id,
                        tool_call_id = %approval.tool_call_id,
                        function = %approval.qualified_name(),
                        "tool approval required"
                    );
                    self.observer.on_approval_required(&approval);
                }
                None
            }
            StreamEvent::Done => Some(Ok(StreamOutcome::Completed)),
            StreamEvent::Error(payload) => {
                tracing::error!(chat_id = %self.chat_id, payload = %payload, "server reported stream error");
                Some(Err(ChatSessionError::ServerReported(payload)))
            }
            StreamEvent::Unknown(name) => {
                tracing::debug!(chat_id = %self.chat_id, event = %name, "ignoring unknown event");
                None
            }
        }
    }

    /// Common exit path: reset state, notify, re-fetch, log.
    async fn finish(
        &self,
        generation: u64,
        origin: StreamOrigin,
        started: Instant,
        stats: EpisodeStats,
        result: Result<StreamOutcome, ChatSessionError>,
    ) -> Result<StreamOutcome, ChatSessionError> {
        let owned = {
            let mut st = self.state.write().await;
            if st.owns(generation) {
                st.end();
                if let Err(ref e) = result {
                    st.last_error = Some(e.to_string());
                }
                true
            } else {
                false
            }
        };

        // A stream that lost ownership was cancelled; cancel() did the
        // cleanup and the re-fetch, and any late error is moot.
        let result = if owned {
            result
        } else {
            Ok(StreamOutcome::Cancelled)
        };

        let outcome = match result {
            Ok(ref outcome) => outcome.as_str(),
            Err(ref e) => {
                tracing::error!(chat_id = %self.chat_id, generation, error = %e, "stream failed");
                self.observer.on_error(e);
                "failed"
            }
        };
        self.observer.on_stream_finished(outcome);

        if owned {
            self.reconcile().await;
        }

        self.logger
            .log(&StreamLog {
                ts: Utc::now(),
                chat_id: self.chat_id.clone(),
                origin,
                outcome: outcome.to_string(),
                fragments: stats.fragments,
                chars: stats.chars,
                approvals: stats.approvals,
                duration_ms: started.elapsed().as_millis() as u64,
                error: result.as_ref().err().map(|e| e.to_string()),
            })
            .await;

        result
    }

    /// Re-fetch after a stream or approval; failures are logged and the
    /// stale copy kept.
    async fn reconcile(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(chat_id = %self.chat_id, error = %e, "failed to re-fetch chat");
        }
    }
}

async fn next_chunk(stream: &mut ByteStream, idle_timeout: Option<Duration>) -> Chunk {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Chunk::TimedOut,
        },
        None => stream.next().await,
    };
    match next {
        Some(item) => Chunk::Data(item),
        None => Chunk::End,
    }
}
