use std::collections::BTreeMap;

use bundlewire_frame::Message;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommandError, Result};
use crate::request::PROTOCOL_VERSION;

/// The orchestrator's settings object, as returned for `all_settings`.
///
/// Keys this crate does not model are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_bundle_contents_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_bundle_name: Option<String>,
    #[serde(default)]
    pub create_app_bundle: bool,
    #[serde(default)]
    pub can_create_dir: bool,
    #[serde(default)]
    pub can_overwrite_files: bool,
    #[serde(default)]
    pub search_paths: Vec<String>,
    #[serde(default, deserialize_with = "truthy")]
    pub verbose: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One library a bundled binary links against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default)]
    pub framework_name: String,
    #[serde(default)]
    pub is_framework: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dependency graph returned for `dylib_info`: binary path to its libraries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DylibInfo {
    #[serde(default)]
    pub src_files: BTreeMap<String, Vec<Dependency>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DylibInfo {
    /// Whether any binary links a framework whose name starts with `prefix`.
    pub fn uses_framework(&self, prefix: &str) -> bool {
        self.frameworks().any(|name| name.starts_with(prefix))
    }

    /// Framework names across all binaries, in binary order, with repeats.
    pub fn frameworks(&self) -> impl Iterator<Item = &str> {
        self.src_files
            .values()
            .flatten()
            .filter(|dep| dep.is_framework)
            .map(|dep| dep.framework_name.as_str())
    }
}

/// Acknowledgement for commands that only succeed or fail.
///
/// `{}` or `{"error": null}` is success; any other `error` value is a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty)
    }

    /// `Err(CommandError::Remote)` if the peer reported an error.
    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(error) if !error.is_empty() => Err(CommandError::Remote(error)),
            _ => Ok(()),
        }
    }
}

/// A reply produced by a command handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain text, sent as-is.
    Text(String),
    /// A JSON document.
    Json(Value),
}

impl Reply {
    /// The protocol version string.
    pub fn protocol() -> Self {
        Reply::Text(PROTOCOL_VERSION.to_string())
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Reply::Json(serde_json::to_value(value)?))
    }

    pub fn ack(ack: Ack) -> Self {
        match ack.error {
            Some(error) => Reply::Json(serde_json::json!({ "error": error })),
            None => Reply::Json(Value::Object(Map::new())),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::ack(Ack::failed(message))
    }

    pub fn into_message(self) -> Message {
        match self {
            Reply::Text(text) => Message::from(text),
            Reply::Json(value) => Message::from(value.to_string()),
        }
    }
}

/// The error a peer reported in a JSON reply, if any.
///
/// Matches how replies are checked on the other side: a present, non-null,
/// non-empty `error` field.
pub fn remote_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(error) if error.is_empty() => None,
        Value::String(error) => Some(error.clone()),
        other => Some(other.to_string()),
    }
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    })
}
