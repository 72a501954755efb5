//! Streaming chat session controller for the admin console.
//!
//! Sends chat messages to the console backend, renders the assistant reply
//! as it streams in over server-sent events, pauses for human approval of
//! tool calls, and lets the user cancel generation mid-flight.
//!
//! - `ChatSession`: per-chat state machine (send / cancel / resolve approval)
//! - `ChatApiClient`: reqwest implementation of the `ChatBackend` endpoints
//! - `SseDecoder`: chunk-boundary-safe event-stream frame decoder
//! - `Attachment` / `compose_content`: staged files to multi-part content
//! - `Typeahead`: picker filter state
//! - `ClientConfig`: TOML + environment configuration

pub mod api;
pub mod attachment;
pub mod config;
pub mod error;
pub mod logging;
pub mod picker;
pub mod session;
pub mod sse;
pub mod traits;
pub mod types;

pub use api::ChatApiClient;
pub use attachment::{compose_content, Attachment, AttachmentKind};
pub use config::ClientConfig;
pub use error::ChatSessionError;
pub use logging::{StreamLog, StreamLogger, StreamOrigin};
pub use picker::Typeahead;
pub use session::{ApprovalOutcome, ChatSession, SessionPhase, StreamOutcome};
pub use sse::{SseDecoder, SseFrame, StreamEvent};
pub use traits::{ByteStream, ChatBackend, NoopObserver, SessionObserver};
pub use types::{
    ApprovalResponse, Chat, ChatSummary, ContentPart, DefaultParameter, MediaSource, Message,
    MessageContent, PendingApproval, Role, ToolBinding, ToolCall, ToolFunction,
};
