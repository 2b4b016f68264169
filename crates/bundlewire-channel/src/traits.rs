use std::time::Duration;

use bytes::Bytes;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::retry::RetryPolicy;

/// Outcome of a successful [`Channel::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Exactly the requested number of bytes.
    Data(Bytes),
    /// The peer closed its end before the first requested byte arrived.
    ///
    /// This is a clean termination, not a fault. Closing after a partial
    /// read is reported as [`ChannelError::UnexpectedEof`](crate::ChannelError::UnexpectedEof).
    PeerClosed,
}

impl Received {
    /// The received bytes, or `None` if the peer closed.
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            Received::Data(bytes) => Some(bytes),
            Received::PeerClosed => None,
        }
    }
}

/// A blocking, exact-count byte channel to the parent (or child) process.
///
/// Implementations own their descriptors exclusively. `close` must be
/// idempotent and every later operation must fail with
/// [`ChannelError::Closed`](crate::ChannelError::Closed).
pub trait Channel {
    /// Establish the connection. A no-op for already-connected streams.
    fn open(&mut self) -> Result<()>;

    /// Write all of `bytes`, retrying stalls within the write budget.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read exactly `n` bytes.
    fn recv(&mut self, n: usize) -> Result<Received>;

    /// Release the descriptors. Failures are swallowed.
    fn close(&mut self);

    /// Whether the channel currently holds open descriptors.
    fn is_open(&self) -> bool;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn recv(&mut self, n: usize) -> Result<Received> {
        (**self).recv(n)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Timing and cancellation shared by both channel variants.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Budget for waiting on the peer to attach (named pipes only).
    pub connect: RetryPolicy,
    /// Budget for reads that report would-block.
    pub read: RetryPolicy,
    /// Budget for writes that report would-block.
    pub write: RetryPolicy,
    /// How long to wait for read-readiness before giving up (named pipes only).
    pub poll_timeout: Duration,
    /// Fired from another thread to close the channel mid-wait.
    pub cancel: CancelToken,
}

impl ChannelConfig {
    /// Default readiness timeout: 20 seconds.
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(20);
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect: RetryPolicy::CONNECT,
            read: RetryPolicy::IO,
            write: RetryPolicy::IO,
            poll_timeout: Self::DEFAULT_POLL_TIMEOUT,
            cancel: CancelToken::new(),
        }
    }
}
