use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Binary payload of an image, audio or file part. Either inline base64
/// `data` or a remote `url` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One typed part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(flatten)]
        source: MediaSource,
    },
    Audio {
        #[serde(flatten)]
        source: MediaSource,
    },
    File {
        #[serde(flatten)]
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// A part type this client does not know; kept so the rest of the
    /// message still loads.
    #[serde(other)]
    Unknown,
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the message, ignoring non-text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.trim().is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

fn content_or_empty<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

/// Target function of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A tool call recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

/// A single message in a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    /// Assistant tool-call turns may carry `null` or no content.
    #[serde(default, deserialize_with = "content_or_empty")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build the optimistic local copy of a message the user is sending.
    /// It lives only until the next re-fetch of the chat.
    pub fn pending_user(chat_id: &str, content: MessageContent) -> Self {
        Self {
            id: format!("pending-{}", uuid::Uuid::new_v4()),
            chat_id: chat_id.to_string(),
            role: Role::User,
            content,
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.starts_with("pending-")
    }
}

/// A chat conversation as returned by `GET /chats/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry from `GET /chats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

impl ChatSummary {
    pub fn label(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => format!("Untitled ({})", self.id),
        }
    }
}

/// A tool call waiting on a human decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingApproval {
    pub tool_call_id: String,
    pub function_namespace: String,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

impl PendingApproval {
    /// `namespace/name`, or just `name` when there is no namespace.
    pub fn qualified_name(&self) -> String {
        if self.function_namespace.is_empty() {
            self.function_name.clone()
        } else {
            format!("{}/{}", self.function_namespace, self.function_name)
        }
    }
}

#[derive(Deserialize)]
struct RawApproval {
    tool_call_id: String,
    #[serde(default, alias = "namespace")]
    function_namespace: Option<String>,
    #[serde(default, alias = "name", alias = "function")]
    function_name: Option<String>,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl<'de> Deserialize<'de> for PendingApproval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawApproval::deserialize(deserializer)?;
        let name = raw.function_name.unwrap_or_default();
        let (namespace, name) = match raw.function_namespace {
            Some(ns) => (ns, name),
            None => match name.split_once('/') {
                Some((ns, n)) => (ns.to_string(), n.to_string()),
                None => (String::new(), name),
            },
        };
        Ok(PendingApproval {
            tool_call_id: raw.tool_call_id,
            function_namespace: namespace,
            function_name: name,
            arguments: raw.arguments,
        })
    }
}

/// Reply of `POST /chats/{id}/approve-tool/{tool_call_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Default value for a tool parameter.
///
/// Records written before the lock flag existed store a bare value; both
/// shapes are read, only `{value, locked}` is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultParameter {
    pub value: serde_json::Value,
    pub locked: bool,
}

impl<'de> Deserialize<'de> for DefaultParameter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::Object(ref map) = value {
            let only_known = map.keys().all(|k| k == "value" || k == "locked");
            if only_known && map.contains_key("value") {
                let locked = map
                    .get("locked")
                    .and_then(|l| l.as_bool())
                    .unwrap_or(false);
                return Ok(DefaultParameter {
                    value: map.get("value").cloned().unwrap_or_default(),
                    locked,
                });
            }
        }
        Ok(DefaultParameter {
            value,
            locked: false,
        })
    }
}

/// A function an agent may call, with its default parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolBinding {
    pub function_namespace: String,
    pub function_name: String,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub default_parameters: BTreeMap<String, DefaultParameter>,
}

impl ToolBinding {
    /// Merge call arguments over the defaults. Locked defaults always win.
    pub fn effective_arguments(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = arguments.clone();
        for (key, default) in &self.default_parameters {
            if default.locked || !merged.contains_key(key) {
                merged.insert(key.clone(), default.value.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn message_content_accepts_string_or_parts() {
        let text: MessageContent = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, MessageContent::Text("hello".to_string()));

        let parts: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "look at "},
            {"type": "image", "data": "aGk=", "mime_type": "image/png"},
            {"type": "text", "text": "this"}
        ]))
        .unwrap();
        match &parts {
            MessageContent::Parts(p) => {
                assert_eq!(p.len(), 3);
                assert!(matches!(p[1], ContentPart::Image { .. }));
            }
            other => panic!("expected parts, got {:?}", other),
        }
        assert_eq!(parts.text(), "look at this");
    }

    #[test]
    fn file_part_serializes_flat() {
        let part = ContentPart::File {
            source: MediaSource {
                url: Some("https://cdn.example.com/r.pdf".to_string()),
                data: None,
                mime_type: Some("application/pdf".to_string()),
            },
            filename: Some("r.pdf".to_string()),
        };
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "file");
        assert_eq!(v["url"], "https://cdn.example.com/r.pdf");
        assert_eq!(v["filename"], "r.pdf");
        assert!(v.get("data").is_none());
    }

    #[test]
    fn chat_deserializes_with_tool_messages() {
        let chat: Chat = serde_json::from_value(json!({
            "id": "c1",
            "title": "Support",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:05:00Z",
            "messages": [
                {
                    "id": "m1", "chat_id": "c1", "role": "assistant", "content": "",
                    "tool_calls": [{"id": "tc1", "function": {"namespace": "email", "name": "send", "arguments": {"to": "a@b.com"}}}],
                    "created_at": "2024-05-01T10:01:00Z"
                },
                {
                    "id": "m2", "chat_id": "c1", "role": "tool", "content": "sent",
                    "tool_call_id": "tc1", "created_at": "2024-05-01T10:02:00Z"
                }
            ]
        }))
        .unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert!(!chat.archived);
        let calls = chat.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.namespace.as_deref(), Some("email"));
        assert_eq!(chat.messages[1].tool_call_id.as_deref(), Some("tc1"));
    }

    #[test]
    fn chat_tolerates_null_content_and_unknown_parts() {
        let chat: Chat = serde_json::from_value(json!({
            "id": "c1",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:05:00Z",
            "messages": [
                {
                    "id": "m1", "chat_id": "c1", "role": "assistant", "content": null,
                    "tool_calls": [{"id": "tc1", "function": {"name": "lookup", "arguments": {}}}],
                    "created_at": "2024-05-01T10:01:00Z"
                },
                {
                    "id": "m2", "chat_id": "c1", "role": "assistant",
                    "created_at": "2024-05-01T10:02:00Z"
                },
                {
                    "id": "m3", "chat_id": "c1", "role": "user",
                    "content": [
                        {"type": "text", "text": "see chart"},
                        {"type": "video", "url": "https://cdn.example.com/v.mp4"}
                    ],
                    "created_at": "2024-05-01T10:03:00Z"
                }
            ]
        }))
        .unwrap();

        assert_eq!(chat.messages.len(), 3);
        assert_eq!(chat.messages[0].content, MessageContent::default());
        assert!(chat.messages[0].content.is_empty());
        assert!(chat.messages[1].content.is_empty());
        match &chat.messages[2].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[1], ContentPart::Unknown);
            }
            other => panic!("expected parts, got {:?}", other),
        }
        assert_eq!(chat.messages[2].content.text(), "see chart");
    }

    #[test]
    fn pending_user_message_is_marked() {
        let msg = Message::pending_user("c1", "hi".into());
        assert!(msg.is_pending());
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn pending_approval_field_variants() {
        let a: PendingApproval = serde_json::from_value(json!({
            "tool_call_id": "tc1",
            "function_namespace": "email",
            "function_name": "send",
            "arguments": {"to": "a@b.com"}
        }))
        .unwrap();
        assert_eq!(a.qualified_name(), "email/send");

        let b: PendingApproval = serde_json::from_value(json!({
            "tool_call_id": "tc2",
            "function": "email/send"
        }))
        .unwrap();
        assert_eq!(b.function_namespace, "email");
        assert_eq!(b.function_name, "send");
        assert!(b.arguments.is_null());

        let c: PendingApproval = serde_json::from_value(json!({
            "tool_call_id": "tc3",
            "name": "ping"
        }))
        .unwrap();
        assert_eq!(c.qualified_name(), "ping");
    }

    #[test]
    fn default_parameter_reads_legacy_and_current_shapes() {
        let legacy: DefaultParameter = serde_json::from_value(json!("noreply@corp")).unwrap();
        assert_eq!(legacy.value, json!("noreply@corp"));
        assert!(!legacy.locked);

        let current: DefaultParameter =
            serde_json::from_value(json!({"value": 5, "locked": true})).unwrap();
        assert_eq!(current.value, json!(5));
        assert!(current.locked);

        // An object default that is not the wrapper shape stays a value.
        let obj: DefaultParameter =
            serde_json::from_value(json!({"host": "db", "port": 5432})).unwrap();
        assert_eq!(obj.value["port"], 5432);

        let written = serde_json::to_value(&legacy).unwrap();
        assert_eq!(written, json!({"value": "noreply@corp", "locked": false}));
    }

    #[test]
    fn locked_defaults_override_arguments() {
        let binding: ToolBinding = serde_json::from_value(json!({
            "function_namespace": "email",
            "function_name": "send",
            "requires_approval": true,
            "default_parameters": {
                "from": {"value": "noreply@corp", "locked": true},
                "cc": "team@corp"
            }
        }))
        .unwrap();
        let args = json!({"from": "me@corp", "cc": "boss@corp", "to": "a@b.com"});
        let merged = binding.effective_arguments(args.as_object().unwrap());
        assert_eq!(merged["from"], "noreply@corp");
        assert_eq!(merged["cc"], "boss@corp");
        assert_eq!(merged["to"], "a@b.com");
    }
}
