use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::ChatSessionError;
use crate::types::{ApprovalResponse, Chat, ChatSummary, MessageContent, PendingApproval};

/// Raw body of an event-stream response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatSessionError>> + Send>>;

/// The backend endpoints a chat session talks to.
///
/// `ChatApiClient` is the HTTP implementation; tests script their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /chats/{id}/messages/stream`. Resolves once response headers
    /// arrive; the body is consumed through the returned stream.
    async fn open_message_stream(
        &self,
        chat_id: &str,
        content: &MessageContent,
    ) -> Result<ByteStream, ChatSessionError>;

    /// `POST /chats/{id}/approve-tool/{tool_call_id}`.
    async fn resolve_approval(
        &self,
        chat_id: &str,
        tool_call_id: &str,
        approved: bool,
    ) -> Result<ApprovalResponse, ChatSessionError>;

    /// `GET /chats/{id}/stream/{channel_id}`.
    async fn open_channel_stream(
        &self,
        chat_id: &str,
        channel_id: &str,
    ) -> Result<ByteStream, ChatSessionError>;

    /// `GET /chats/{id}`.
    async fn fetch_chat(&self, chat_id: &str) -> Result<Chat, ChatSessionError>;

    /// `GET /chats`.
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ChatSessionError>;
}

/// Receives session updates as they happen. Calls are made from inside the
/// stream loop and must not block.
pub trait SessionObserver: Send + Sync {
    /// A fragment was appended; `buffer` is the full running text.
    fn on_content(&self, _fragment: &str, _buffer: &str) {}

    fn on_approval_required(&self, _approval: &PendingApproval) {}

    /// The authoritative chat was re-fetched.
    fn on_conversation(&self, _chat: &Chat) {}

    /// A stream ended for any reason; streaming state is already reset.
    fn on_stream_finished(&self, _outcome: &str) {}

    fn on_error(&self, _error: &ChatSessionError) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
