//! Typed commands between a bundling helper and the orchestrator that launched it.
//!
//! The helper asks for settings and the dependency graph, then reports
//! search paths and binaries to fix up. Requests are JSON objects tagged by
//! `"cmd"`; replies are JSON documents, `{"error": ...}` acknowledgements,
//! or the plain protocol version string.

pub mod client;
pub mod error;
pub mod reply;
pub mod request;
pub mod responder;

pub use client::Client;
pub use error::{CommandError, Result};
pub use reply::{remote_error, Ack, Dependency, DylibInfo, Reply, Settings};
pub use request::{Request, COMMAND_TAG, PROTOCOL_VERSION};
pub use responder::{serve_commands, serve_commands_while, Fixture};
