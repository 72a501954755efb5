//! Stream episode logger.
//!
//! Writes one structured JSON entry per finished stream: always to tracing,
//! optionally appended to a JSON-lines file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// What opened the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOrigin {
    Send,
    Approval,
}

/// One finished stream episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamLog {
    pub ts: DateTime<Utc>,
    pub chat_id: String,
    pub origin: StreamOrigin,
    pub outcome: String,
    pub fragments: usize,
    pub chars: usize,
    pub approvals: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

pub struct StreamLogger {
    log_path: Option<PathBuf>,
    count: RwLock<u64>,
}

impl StreamLogger {
    /// If `log_path` is `None`, entries go to tracing only.
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            log_path,
            count: RwLock::new(0),
        }
    }

    pub async fn log(&self, entry: &StreamLog) {
        let json = serde_json::to_string(entry).unwrap_or_else(|e| {
            format!(
                r#"{{"error":"serialization failed: {}","ts":"{}"}}"#,
                e,
                Utc::now().to_rfc3339()
            )
        });

        tracing::info!(target: "chat_stream", "{}", json);

        if let Some(ref path) = self.log_path {
            if let Err(e) = append_log_line(path, &json).await {
                tracing::warn!("Failed to write stream log: {}", e);
            }
        }

        *self.count.write().await += 1;
    }

    pub async fn stream_count(&self) -> u64 {
        *self.count.read().await
    }
}

async fn append_log_line(path: &std::path::Path, line: &str) -> Result<(), std::io::Error> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}
