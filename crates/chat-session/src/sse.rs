//! Incremental decoder for `text/event-stream` bodies.
//!
//! Network reads deliver arbitrary byte chunks. The decoder keeps undecoded
//! bytes across reads and only interprets complete `\n`-terminated lines, so
//! a frame (or a multi-byte character) split across reads is reassembled
//! before anything is emitted.

use serde::Deserialize;

use crate::error::ChatSessionError;
use crate::types::PendingApproval;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Line-buffering SSE frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buf[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + pos;
            let mut line = &self.buf[consumed..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            consumed = end + 1;
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buf.drain(..consumed);
        frames
    }

    /// Flush at end of body: a trailing unterminated line is processed and
    /// any frame still being assembled is dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => match self.data {
                Some(ref mut d) => {
                    d.push('\n');
                    d.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            // id/retry carry nothing the controller uses.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Typed view of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental output. Either field may be absent.
    Message {
        content: Option<String>,
        approval: Option<PendingApproval>,
    },
    Done,
    Error(serde_json::Value),
    Unknown(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }

    /// Interpret a frame. Only `message` and `error` payloads must be JSON;
    /// a `done` frame's payload is ignored.
    pub fn from_frame(frame: &SseFrame) -> Result<StreamEvent, ChatSessionError> {
        match frame.event.as_str() {
            "message" => {
                let payload: serde_json::Value = serde_json::from_str(&frame.data)
                    .map_err(|e| ChatSessionError::MalformedFrame(format!("{}: {}", e, frame.data)))?;
                Ok(parse_message_payload(&payload))
            }
            "done" => Ok(StreamEvent::Done),
            "error" => {
                let payload = serde_json::from_str(&frame.data)
                    .unwrap_or_else(|_| serde_json::Value::String(frame.data.clone()));
                Ok(StreamEvent::Error(payload))
            }
            other => Ok(StreamEvent::Unknown(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct TypedPayload {
    #[serde(rename = "type")]
    kind: String,
}

fn parse_message_payload(payload: &serde_json::Value) -> StreamEvent {
    let content = payload
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string());

    // The approval object is either the payload itself or nested in it.
    let approval = std::iter::once(payload)
        .chain(["approval", "data", "tool_call"].iter().filter_map(|k| payload.get(*k)))
        .find(|v| {
            TypedPayload::deserialize(*v)
                .map(|t| t.kind == "approval_required")
                .unwrap_or(false)
        })
        .and_then(|v| match PendingApproval::deserialize(v) {
            Ok(a) => Some(a),
            Err(e) => {
                tracing::warn!(error = %e, "approval_required payload missing fields");
                None
            }
        });

    StreamEvent::Message { content, approval }
}
