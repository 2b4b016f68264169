use bundlewire_channel::Channel;
use bundlewire_frame::{FramedTransport, Message};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{CommandError, Result};
use crate::reply::{remote_error, Ack, DylibInfo, Settings};
use crate::request::Request;

/// Helper-side command client: one typed method per command.
#[derive(Debug)]
pub struct Client<C> {
    transport: FramedTransport<C>,
}

impl<C: Channel> Client<C> {
    pub fn new(transport: FramedTransport<C>) -> Self {
        Self { transport }
    }

    pub fn from_channel(channel: C) -> Self {
        Self::new(FramedTransport::new(channel))
    }

    /// The peer's protocol version string.
    pub fn protocol(&mut self) -> Result<String> {
        let reply = self.request(&Request::GetProtocol)?;
        let text = reply
            .as_str()
            .map_err(|_| CommandError::InvalidReply("protocol version is not UTF-8 text".to_string()))?;
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if let Some(error) = remote_error(&value) {
                return Err(CommandError::Remote(error));
            }
        }
        Ok(text.to_string())
    }

    pub fn settings(&mut self) -> Result<Settings> {
        self.request_json(&Request::AllSettings)
    }

    pub fn dylib_info(&mut self) -> Result<DylibInfo> {
        self.request_json(&Request::DylibInfo)
    }

    pub fn add_search_paths<I, S>(&mut self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths = paths.into_iter().map(Into::into).collect();
        self.request_json::<Ack>(&Request::AddSearchPaths { paths })?
            .into_result()
    }

    pub fn fixup_binaries<I, S>(&mut self, binaries: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let binaries = binaries.into_iter().map(Into::into).collect();
        self.request_json::<Ack>(&Request::FixupBinaries { binaries })?
            .into_result()
    }

    /// Send any request and return the raw reply.
    pub fn request(&mut self, request: &Request) -> Result<Message> {
        debug!(cmd = request.name(), "sending request");
        let reply = self.transport.ask(request.encode()?)?;
        Ok(reply)
    }

    pub fn transport(&self) -> &FramedTransport<C> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut FramedTransport<C> {
        &mut self.transport
    }

    pub fn into_inner(self) -> FramedTransport<C> {
        self.transport
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    fn request_json<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T> {
        let reply = self.request(request)?;
        let value: Value = serde_json::from_slice(reply.as_bytes())?;
        if let Some(error) = remote_error(&value) {
            return Err(CommandError::Remote(error));
        }
        Ok(serde_json::from_value(value)?)
    }
}
