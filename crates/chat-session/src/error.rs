use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatSessionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("server reported an error: {0}")]
    ServerReported(serde_json::Value),

    #[error("a stream is already active for this chat")]
    StreamActive,

    #[error("approval '{0}' is not pending")]
    UnknownApproval(String),

    #[error("approval '{0}' is already being resolved")]
    ApprovalInFlight(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatSessionError {
    /// Whether this error came from the network or the server rather than
    /// from a rejected local precondition.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChatSessionError::Connection(_)
                | ChatSessionError::Status { .. }
                | ChatSessionError::Auth(_)
                | ChatSessionError::ParseError(_)
        )
    }
}
