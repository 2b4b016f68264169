//! Length-prefixed request/reply framing for bundlewire channels.
//!
//! Every message on the wire is a 4-byte big-endian length followed by that
//! many payload bytes. [`FramedTransport`] layers the strictly alternating
//! `ask`/`serve` protocol on top of any [`Channel`](bundlewire_channel::Channel).

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;

pub use codec::{
    decode_message, decode_prefix, encode_message, FrameConfig, DEFAULT_MAX_MESSAGE_SIZE,
    MAX_ENCODABLE, PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use message::Message;
pub use transport::{FramedTransport, ServeSummary, SessionState};
