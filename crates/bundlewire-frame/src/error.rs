use bundlewire_channel::ChannelError;

/// Errors that can occur while framing or exchanging messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Channel-level failure, passed through as-is.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A payload (outgoing) or declared length (incoming) exceeds the limit.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The exchange would break strict request/reply alternation.
    #[error("out of turn: {0}")]
    OutOfTurn(&'static str),

    /// The session was closed, locally or after a failed exchange.
    #[error("session closed")]
    SessionClosed,
}

impl FrameError {
    /// The underlying channel error, if this came from the channel.
    pub fn as_channel(&self) -> Option<&ChannelError> {
        match self {
            FrameError::Channel(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
