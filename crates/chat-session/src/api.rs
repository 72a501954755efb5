//! HTTP client for the console chat endpoints.
//!
//! Every request carries the bearer token. Stream endpoints return the raw
//! body as a byte stream for the session's SSE decoder.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ChatSessionError;
use crate::traits::{ByteStream, ChatBackend};
use crate::types::{ApprovalResponse, Chat, ChatSummary, MessageContent};

/// Chat API client.
#[derive(Clone)]
pub struct ChatApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    content: &'a MessageContent,
}

#[derive(Serialize)]
struct ApprovalBody {
    approved: bool,
}

impl ChatApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ChatSessionError> {
        config.validate()?;

        // No total timeout: it would cut off long-running streams.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ChatSessionError::Internal(format!("HTTP client init: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for s in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(s));
        }
        url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, ChatSessionError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| ChatSessionError::Connection(format!("{} failed: {}", what, e)))?;
        check_status(resp).await
    }

    async fn open_stream(&self, req: RequestBuilder, what: &str) -> Result<ByteStream, ChatSessionError> {
        let resp = self.send(req.header(ACCEPT, "text/event-stream"), what).await?;
        let stream = resp.bytes_stream().map(|chunk| {
            chunk.map_err(|e| ChatSessionError::Connection(format!("stream read failed: {}", e)))
        });
        Ok(Box::pin(stream))
    }
}

async fn check_status(resp: Response) -> Result<Response, ChatSessionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ChatSessionError::Auth(format!("{}: {}", status, body)));
    }
    Err(ChatSessionError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn open_message_stream(
        &self,
        chat_id: &str,
        content: &MessageContent,
    ) -> Result<ByteStream, ChatSessionError> {
        let req = self
            .client
            .post(self.url(&["chats", chat_id, "messages", "stream"]))
            .json(&SendMessageBody { content });
        self.open_stream(req, "message stream").await
    }

    async fn resolve_approval(
        &self,
        chat_id: &str,
        tool_call_id: &str,
        approved: bool,
    ) -> Result<ApprovalResponse, ChatSessionError> {
        let req = self
            .client
            .post(self.url(&["chats", chat_id, "approve-tool", tool_call_id]))
            .json(&ApprovalBody { approved });
        let resp = self.send(req, "approve-tool").await?;
        let text = resp
            .text()
            .await
            .map_err(|e| ChatSessionError::Connection(format!("approve-tool read: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(ApprovalResponse::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| ChatSessionError::ParseError(format!("approve-tool parse: {}", e)))
    }

    async fn open_channel_stream(
        &self,
        chat_id: &str,
        channel_id: &str,
    ) -> Result<ByteStream, ChatSessionError> {
        let req = self
            .client
            .get(self.url(&["chats", chat_id, "stream", channel_id]));
        self.open_stream(req, "channel stream").await
    }

    async fn fetch_chat(&self, chat_id: &str) -> Result<Chat, ChatSessionError> {
        let req = self.client.get(self.url(&["chats", chat_id]));
        let resp = self.send(req, "get chat").await?;
        resp.json()
            .await
            .map_err(|e| ChatSessionError::ParseError(format!("chat parse: {}", e)))
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ChatSessionError> {
        let req = self.client.get(self.url(&["chats"]));
        let resp = self.send(req, "list chats").await?;
        resp.json()
            .await
            .map_err(|e| ChatSessionError::ParseError(format!("chat list parse: {}", e)))
    }
}
