use bundlewire_channel::{Channel, ChannelError, Received};
use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{check_declared_len, decode_prefix, encode_message, FrameConfig, PREFIX_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Where a session stands between and during exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exchange in progress.
    Idle,
    /// Writing a request or reply.
    Sending,
    /// Request written, waiting for the reply's length prefix.
    AwaitingReply,
    /// Waiting for the length prefix of the next request.
    AwaitingLengthPrefix,
    /// Prefix read, reading the body.
    AwaitingBody,
    /// Terminal. Reached by `close()`, by the peer closing, or by a failed exchange.
    Closed,
}

/// Outcome of a `serve` loop that ended without error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Requests answered.
    pub requests: usize,
}

/// Length-prefixed request/reply session over one [`Channel`].
///
/// Exchanges strictly alternate: every `ask` reads its reply before
/// returning, and a responder must answer each request before reading the
/// next one. `&mut self` keeps a session on one thread at a time; wrap it in
/// a `Mutex` to share it, never the underlying channel.
///
/// The transport does not retry. Channel errors surface unmodified, and a
/// failure part-way through an exchange closes the session because the
/// position on the wire is no longer known.
#[derive(Debug)]
pub struct FramedTransport<C> {
    channel: C,
    config: FrameConfig,
    state: SessionState,
    reply_due: bool,
    buf: BytesMut,
}

impl<C: Channel> FramedTransport<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, FrameConfig::default())
    }

    pub fn with_config(channel: C, config: FrameConfig) -> Self {
        Self {
            channel,
            config,
            state: SessionState::Idle,
            reply_due: false,
            buf: BytesMut::new(),
        }
    }

    /// Open the channel. Called implicitly by the first exchange.
    pub fn open(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(FrameError::SessionClosed);
        }
        self.channel.open()?;
        Ok(())
    }

    /// Send one request and wait for its reply.
    ///
    /// The peer closing before the reply arrives is an error here, unlike
    /// in [`serve`](Self::serve).
    pub fn ask(&mut self, payload: impl Into<Message>) -> Result<Message> {
        self.ensure_ready()?;
        if self.reply_due {
            return Err(FrameError::OutOfTurn("a reply is owed to the peer"));
        }
        let payload = payload.into();
        self.check_outgoing(&payload)?;

        match self.exchange(&payload) {
            Ok(reply) => {
                self.state = SessionState::Idle;
                Ok(reply)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Read the next request, or `None` once the peer has closed.
    ///
    /// The request must be answered with [`send_reply`](Self::send_reply)
    /// before anything else happens on this session.
    pub fn recv_request(&mut self) -> Result<Option<Message>> {
        if self.state == SessionState::Closed {
            return Err(FrameError::SessionClosed);
        }
        if self.reply_due {
            return Err(FrameError::OutOfTurn("previous request has not been answered"));
        }
        self.ensure_ready()?;

        self.state = SessionState::AwaitingLengthPrefix;
        match self.read_message() {
            Ok(Some(request)) => {
                self.state = SessionState::Idle;
                self.reply_due = true;
                Ok(Some(request))
            }
            Ok(None) => {
                debug!(transport = self.channel.transport_name(), "peer closed session");
                self.close();
                Ok(None)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Answer the request returned by the last [`recv_request`](Self::recv_request).
    pub fn send_reply(&mut self, reply: impl Into<Message>) -> Result<()> {
        self.ensure_ready()?;
        if !self.reply_due {
            return Err(FrameError::OutOfTurn("no request to answer"));
        }
        let reply = reply.into();
        // An unsendable reply would leave the peer waiting forever.
        if let Err(err) = self.check_outgoing(&reply) {
            return Err(self.abort(err));
        }

        self.state = SessionState::Sending;
        match self.write_message(&reply) {
            Ok(()) => {
                self.state = SessionState::Idle;
                self.reply_due = false;
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Answer requests with `handler` until the peer closes.
    ///
    /// The peer closing at a message boundary ends the loop normally.
    pub fn serve<F>(&mut self, handler: F) -> Result<ServeSummary>
    where
        F: FnMut(Message) -> Message,
    {
        self.serve_while(handler, || true)
    }

    /// Like [`serve`](Self::serve), but checks `keep_running` before each request.
    pub fn serve_while<F, K>(&mut self, mut handler: F, mut keep_running: K) -> Result<ServeSummary>
    where
        F: FnMut(Message) -> Message,
        K: FnMut() -> bool,
    {
        let mut summary = ServeSummary::default();
        while keep_running() {
            let Some(request) = self.recv_request()? else {
                break;
            };
            let reply = handler(request);
            self.send_reply(reply)?;
            summary.requests += 1;
        }
        debug!(requests = summary.requests, "serve loop finished");
        Ok(summary)
    }

    /// Close the session and release the channel. Idempotent.
    pub fn close(&mut self) {
        self.channel.close();
        self.state = SessionState::Closed;
        self.reply_due = false;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    fn ensure_ready(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(FrameError::SessionClosed);
        }
        if !self.channel.is_open() {
            self.open()?;
        }
        Ok(())
    }

    fn check_outgoing(&self, message: &Message) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }

    fn exchange(&mut self, payload: &Message) -> Result<Message> {
        self.state = SessionState::Sending;
        self.write_message(payload)?;

        self.state = SessionState::AwaitingReply;
        self.read_message()?.ok_or_else(|| {
            FrameError::Channel(ChannelError::UnexpectedEof {
                expected: PREFIX_SIZE,
                received: 0,
            })
        })
    }

    fn write_message(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        encode_message(message.as_bytes(), &mut self.buf)?;
        self.channel.send(&self.buf)?;
        trace!(len = message.len(), "message sent");
        Ok(())
    }

    fn read_message(&mut self) -> Result<Option<Message>> {
        let Some(len) = self.read_prefix()? else {
            return Ok(None);
        };
        self.state = SessionState::AwaitingBody;
        let body = self.read_body(len)?;
        trace!(len, "message received");
        Ok(Some(body))
    }

    fn read_prefix(&mut self) -> Result<Option<usize>> {
        let prefix = match self.channel.recv(PREFIX_SIZE)? {
            Received::Data(prefix) => prefix,
            Received::PeerClosed => return Ok(None),
        };
        let prefix = <[u8; PREFIX_SIZE]>::try_from(prefix.as_ref()).map_err(|_| {
            ChannelError::UnexpectedEof {
                expected: PREFIX_SIZE,
                received: prefix.len(),
            }
        })?;
        let len = check_declared_len(decode_prefix(prefix), self.config.max_message_size)?;
        Ok(Some(len))
    }

    fn read_body(&mut self, len: usize) -> Result<Message> {
        if len == 0 {
            return Ok(Message::default());
        }
        match self.channel.recv(len)? {
            Received::Data(body) => Ok(Message::from(body)),
            Received::PeerClosed => Err(FrameError::Channel(ChannelError::UnexpectedEof {
                expected: len,
                received: 0,
            })),
        }
    }

    fn abort(&mut self, err: FrameError) -> FrameError {
        debug!(state = ?self.state, error = %err, "exchange failed, closing session");
        self.close();
        err
    }
}
