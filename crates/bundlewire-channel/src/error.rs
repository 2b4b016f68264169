use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur on a parent/child byte channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A configured endpoint exists but is not a named pipe.
    #[error("{path} is not a named pipe")]
    NotAPipe { path: PathBuf },

    /// The other end never attached within the connect budget.
    #[error("connect to {path}: no peer attached after {attempts} attempts")]
    PeerNotConnected { path: PathBuf, attempts: u32 },

    /// Reads kept stalling until the read budget ran out.
    #[error("read timed out after {attempts} attempts ({elapsed:?})")]
    ReadTimeout { attempts: u32, elapsed: Duration },

    /// Writes kept stalling until the write budget ran out.
    #[error("write timed out after {attempts} attempts ({elapsed:?})")]
    WriteTimeout { attempts: u32, elapsed: Duration },

    /// No readiness event arrived within the poll timeout.
    #[error("read: no response from peer within {timeout:?}")]
    NoResponse { timeout: Duration },

    /// The stream ended in the middle of a message.
    #[error("unexpected end of stream ({received} of {expected} bytes)")]
    UnexpectedEof { expected: usize, received: usize },

    /// The channel has been closed locally.
    #[error("channel closed")]
    Closed,

    /// Failed to create a named pipe.
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Any other I/O error on the underlying descriptors.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// True for the errors that come from an exhausted retry budget or poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ChannelError::ReadTimeout { .. }
                | ChannelError::WriteTimeout { .. }
                | ChannelError::NoResponse { .. }
                | ChannelError::PeerNotConnected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
