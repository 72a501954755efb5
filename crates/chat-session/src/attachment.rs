//! Files staged by the user before a message is sent.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ChatSessionError;
use crate::types::{ContentPart, MediaSource, MessageContent};

/// Coarse MIME class of an attachment; decides the content part type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Audio,
    File,
}

/// A staged file. Consumed when the message is composed.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: uuid::Uuid,
    pub name: String,
    pub kind: AttachmentKind,
    pub mime_type: String,
    /// Base64 of the file contents.
    pub data: String,
}

impl Attachment {
    pub async fn from_path(path: &Path) -> Result<Self, ChatSessionError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::from_bytes(&name, &bytes))
    }

    pub fn from_bytes(name: &str, bytes: &[u8]) -> Self {
        let mime_type = mime_for(name);
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            kind: classify(&mime_type),
            mime_type,
            data: STANDARD.encode(bytes),
        }
    }

    pub fn into_part(self) -> ContentPart {
        let source = MediaSource {
            url: None,
            data: Some(self.data),
            mime_type: Some(self.mime_type),
        };
        match self.kind {
            AttachmentKind::Image => ContentPart::Image { source },
            AttachmentKind::Audio => ContentPart::Audio { source },
            AttachmentKind::File => ContentPart::File {
                source,
                filename: Some(self.name),
            },
        }
    }
}

/// Plain text when nothing is attached, otherwise a part list led by the
/// text (if any).
pub fn compose_content(text: &str, attachments: Vec<Attachment>) -> MessageContent {
    if attachments.is_empty() {
        return MessageContent::Text(text.to_string());
    }
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.trim().is_empty() {
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }
    parts.extend(attachments.into_iter().map(Attachment::into_part));
    MessageContent::Parts(parts)
}

fn mime_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn classify(mime_type: &str) -> AttachmentKind {
    if mime_type.starts_with("image/") {
        AttachmentKind::Image
    } else if mime_type.starts_with("audio/") {
        AttachmentKind::Audio
    } else {
        AttachmentKind::File
    }
}
