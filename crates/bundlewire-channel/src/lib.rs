//! Byte channels between a helper process and the process that launched it.
//!
//! Two interchangeable variants sit behind the [`Channel`] trait:
//! - [`StreamChannel`]: inherited stdin/stdout (or any connected `Read`/`Write` pair)
//! - [`FifoChannel`]: a pair of named pipes opened by path (Unix)
//!
//! This is the lowest layer of bundlewire. Framing lives in `bundlewire-frame`.

pub mod cancel;
pub mod error;
pub mod retry;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod fifo;

pub use cancel::CancelToken;
pub use error::{ChannelError, Result};
pub use retry::{RetryError, RetryPolicy};
pub use stream::StreamChannel;
pub use traits::{Channel, ChannelConfig, Received};

#[cfg(unix)]
pub use fifo::{
    create_fifo, ensure_fifo, FifoChannel, FifoPair, FifoPaths, DEFAULT_INBOUND, DEFAULT_OUTBOUND,
};
