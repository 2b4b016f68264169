use bundlewire_frame::FrameError;

/// Errors that can occur while exchanging typed commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Framing or channel failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request payload is not a command this protocol knows.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The reply payload does not have the expected shape.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// The peer answered with `{"error": ...}`.
    #[error("peer reported an error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, CommandError>;
