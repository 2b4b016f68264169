use bundlewire_channel::Channel;
use bundlewire_frame::{FramedTransport, ServeSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::reply::{Ack, DylibInfo, Reply, Settings};
use crate::request::Request;

/// Answer typed requests until the peer closes.
///
/// Payloads that do not decode to a [`Request`] are answered with
/// `{"error": ...}` and the session carries on.
pub fn serve_commands<C, F>(transport: &mut FramedTransport<C>, handler: F) -> Result<ServeSummary>
where
    C: Channel,
    F: FnMut(Request) -> Reply,
{
    serve_commands_while(transport, handler, || true)
}

/// Like [`serve_commands`], but checks `keep_running` before each request.
pub fn serve_commands_while<C, F, K>(
    transport: &mut FramedTransport<C>,
    mut handler: F,
    keep_running: K,
) -> Result<ServeSummary>
where
    C: Channel,
    F: FnMut(Request) -> Reply,
    K: FnMut() -> bool,
{
    let summary = transport.serve_while(
        |message| match Request::decode(message.as_bytes()) {
            Ok(request) => {
                debug!(cmd = request.name(), "handling request");
                handler(request).into_message()
            }
            Err(err) => {
                warn!(error = %err, "rejecting request");
                Reply::error(err.to_string()).into_message()
            }
        },
        keep_running,
    )?;
    Ok(summary)
}

/// Canned orchestrator state answering every command.
///
/// Loaded from `{"settings": {...}, "dylib_info": {...}}`. Search paths
/// added by the peer show up in later `all_settings` replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub dylib_info: DylibInfo,
    /// Binaries the peer asked to fix up, in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_up: Vec<String>,
}

impl Fixture {
    pub fn respond(&mut self, request: Request) -> Reply {
        match request {
            Request::GetProtocol => Reply::protocol(),
            Request::AllSettings => json_or_error(&self.settings),
            Request::DylibInfo => json_or_error(&self.dylib_info),
            Request::AddSearchPaths { paths } => {
                for path in paths {
                    if !self.settings.search_paths.contains(&path) {
                        self.settings.search_paths.push(path);
                    }
                }
                Reply::ack(Ack::ok())
            }
            Request::FixupBinaries { binaries } => {
                if let Some(blank) = binaries.iter().position(|binary| binary.trim().is_empty()) {
                    return Reply::error(format!("binary {blank} has an empty path"));
                }
                self.fixed_up.extend(binaries);
                Reply::ack(Ack::ok())
            }
        }
    }
}

fn json_or_error<T: Serialize>(value: &T) -> Reply {
    Reply::json(value).unwrap_or_else(|err| Reply::error(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_answers_every_command() {
        let mut fixture: Fixture = serde_json::from_str(
            r#"{"settings": {"search_paths": ["/opt/qt/lib"], "create_app_bundle": true}}"#,
        )
        .unwrap();

        assert_eq!(fixture.respond(Request::GetProtocol), Reply::protocol());

        let Reply::Json(settings) = fixture.respond(Request::AllSettings) else {
            panic!("settings should be JSON");
        };
        assert_eq!(settings["create_app_bundle"], true);

        let Reply::Json(info) = fixture.respond(Request::DylibInfo) else {
            panic!("dylib info should be JSON");
        };
        assert!(info["src_files"].as_object().unwrap().is_empty());
    }

    #[test]
    fn added_search_paths_are_deduplicated() {
        let mut fixture = Fixture::default();
        let paths = vec!["/a".to_string(), "/b".to_string(), "/a".to_string()];
        assert_eq!(
            fixture.respond(Request::AddSearchPaths { paths }),
            Reply::ack(Ack::ok())
        );
        assert_eq!(fixture.settings.search_paths, vec!["/a", "/b"]);
    }

    #[test]
    fn fixup_records_binaries_or_rejects_blank_paths() {
        let mut fixture = Fixture::default();
        let reply = fixture.respond(Request::FixupBinaries {
            binaries: vec!["Contents/MacOS/app".to_string()],
        });
        assert_eq!(reply, Reply::ack(Ack::ok()));
        assert_eq!(fixture.fixed_up, vec!["Contents/MacOS/app"]);

        let reply = fixture.respond(Request::FixupBinaries {
            binaries: vec!["lib.dylib".to_string(), " ".to_string()],
        });
        assert_eq!(reply, Reply::error("binary 1 has an empty path"));
        assert_eq!(fixture.fixed_up.len(), 1);
    }
}
