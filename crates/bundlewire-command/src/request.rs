use bundlewire_frame::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommandError, Result};

/// Answer to [`Request::GetProtocol`].
pub const PROTOCOL_VERSION: &str = "protocol-v1";

/// Field carrying the command name in a tagged request.
pub const COMMAND_TAG: &str = "cmd";

/// A command sent by the helper to its orchestrator.
///
/// On the wire this is a JSON object tagged by `"cmd"`:
/// `{"cmd":"add_search_paths","paths":["/opt/qt/lib"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// Ask for the protocol version string.
    GetProtocol,
    /// Ask for the orchestrator's settings object.
    AllSettings,
    /// Ask for the dependency graph of the binaries being bundled.
    DylibInfo,
    /// Register extra library search paths with the orchestrator.
    AddSearchPaths { paths: Vec<String> },
    /// Ask the orchestrator to fix up (relink, strip) the given binaries.
    FixupBinaries { binaries: Vec<String> },
}

impl Request {
    /// Command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetProtocol => "get_protocol",
            Request::AllSettings => "all_settings",
            Request::DylibInfo => "dylib_info",
            Request::AddSearchPaths { .. } => "add_search_paths",
            Request::FixupBinaries { .. } => "fixup_binaries",
        }
    }

    /// Encode as a tagged JSON message.
    pub fn encode(&self) -> Result<Message> {
        Ok(Message::from(serde_json::to_vec(self)?))
    }

    /// Decode a request payload.
    ///
    /// Besides the tagged form this accepts a bare command word
    /// (`all_settings`) and a single-key object whose key is the command
    /// and whose value is its argument list (`{"fixup_binaries": [...]}`).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| CommandError::InvalidRequest("request is not UTF-8 text".to_string()))?
            .trim();
        if text.is_empty() {
            return Err(CommandError::InvalidRequest("empty request".to_string()));
        }

        let value = serde_json::from_str::<Value>(text)
            .unwrap_or_else(|_| Value::String(text.to_string()));

        let tagged = match value {
            Value::String(word) => tagged(word, None),
            Value::Object(map) if map.contains_key(COMMAND_TAG) => Value::Object(map),
            Value::Object(map) if map.len() == 1 => {
                let Some((name, args)) = map.into_iter().next() else {
                    return Err(CommandError::InvalidRequest("empty object".to_string()));
                };
                tagged(name, Some(args))
            }
            other => {
                return Err(CommandError::InvalidRequest(format!(
                    "unsupported request shape: {other}"
                )))
            }
        };

        serde_json::from_value(tagged).map_err(|err| CommandError::InvalidRequest(err.to_string()))
    }
}

fn argument_field(command: &str) -> Option<&'static str> {
    match command {
        "add_search_paths" => Some("paths"),
        "fixup_binaries" => Some("binaries"),
        _ => None,
    }
}

fn tagged(command: String, args: Option<Value>) -> Value {
    let mut map = Map::new();
    if let (Some(field), Some(args)) = (argument_field(&command), args) {
        map.insert(field.to_string(), args);
    }
    map.insert(COMMAND_TAG.to_string(), Value::String(command));
    Value::Object(map)
}
