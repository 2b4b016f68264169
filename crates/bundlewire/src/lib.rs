//! Request/reply messaging between a bundling helper and the process that launched it.
//!
//! A helper talks to its parent over inherited stdin/stdout or a pair of
//! named pipes. Every message is a 4-byte big-endian length followed by the
//! payload, and exchanges strictly alternate.
//!
//! # Crate Structure
//!
//! - [`channel`]: Byte channels (inherited stdio, named pipes) and retry budgets
//! - [`frame`]: Length-prefixed framing and the `ask`/`serve` session
//! - [`command`]: Typed deployment commands (behind `command` feature)

/// Re-export channel types.
pub mod channel {
    pub use bundlewire_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bundlewire_frame::*;
}

/// Re-export command types (requires `command` feature).
#[cfg(feature = "command")]
pub mod command {
    pub use bundlewire_command::*;
}
