use std::io::{self, Read, Stdin, Stdout, Write};
use std::time::Duration;

use bytes::BytesMut;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{ChannelError, Result};
use crate::retry::{would_block, RetryPolicy};
use crate::traits::{Channel, ChannelConfig, Received};

/// Channel over an already-connected read/write stream pair.
///
/// The usual instance is [`StreamChannel::stdio`]: the helper process talks
/// to its parent over the inherited standard input and output. Anything
/// else printed by the process must go to stderr.
///
/// The cancel token is checked between reads and writes. A read already
/// blocked in the operating system only returns when the peer writes or
/// closes.
pub struct StreamChannel<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    config: ChannelConfig,
}

impl StreamChannel<Stdin, Stdout> {
    /// Bind the process's inherited stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> StreamChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, ChannelConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: ChannelConfig) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            config,
        }
    }

    /// Take back the streams, or `None` once closed.
    pub fn into_parts(mut self) -> Option<(R, W)> {
        match (self.reader.take(), self.writer.take()) {
            (Some(reader), Some(writer)) => Some((reader, writer)),
            _ => None,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl<R: Read, W: Write> Channel for StreamChannel<R, W> {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(ChannelError::Closed)?;
        let cancel = &self.config.cancel;
        write_all_with(writer, bytes, &self.config.write, cancel, |interval| {
            cancel.sleep(interval);
        })
    }

    fn recv(&mut self, n: usize) -> Result<Received> {
        let reader = self.reader.as_mut().ok_or(ChannelError::Closed)?;
        let policy = self.config.read;
        let cancel = &self.config.cancel;
        read_exact_or_closed(n, |buf| {
            policy
                .run_cancellable(cancel, || reader.read(buf), would_block)
                .map_err(|err| err.into_read_error())
        })
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        if self.reader.take().is_some() {
            debug!("stream channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some() && self.writer.is_some()
    }

    fn transport_name(&self) -> &'static str {
        "stream"
    }
}

impl<R, W> std::fmt::Debug for StreamChannel<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("open", &(self.reader.is_some() && self.writer.is_some()))
            .field("config", &self.config)
            .finish()
    }
}

/// Write every byte, looping on partial writes, then flush.
///
/// The write budget bounds consecutive stalls with no progress. Every
/// accepted chunk starts a fresh budget, so message size does not count
/// against it. `pause` waits between stalled attempts.
pub(crate) fn write_all_with<W: Write + ?Sized>(
    writer: &mut W,
    bytes: &[u8],
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut pause: impl FnMut(Duration),
) -> Result<()> {
    let mut sent = 0usize;
    while sent < bytes.len() {
        let written = policy
            .run_with(cancel, || writer.write(&bytes[sent..]), would_block, &mut pause)
            .map_err(|err| err.into_write_error())?;
        if written == 0 {
            return Err(ChannelError::Io(io::Error::from(io::ErrorKind::WriteZero)));
        }
        sent += written;
    }
    policy
        .run_with(cancel, || writer.flush(), would_block, &mut pause)
        .map_err(|err| err.into_write_error())
}

/// Fill exactly `n` bytes using `read_some`, which returns `Ok(0)` at end of stream.
///
/// End of stream before the first byte is [`Received::PeerClosed`]; after
/// at least one byte it is [`ChannelError::UnexpectedEof`].
pub(crate) fn read_exact_or_closed(
    n: usize,
    mut read_some: impl FnMut(&mut [u8]) -> Result<usize>,
) -> Result<Received> {
    let mut buf = BytesMut::zeroed(n);
    let mut filled = 0usize;
    while filled < n {
        let read = read_some(&mut buf[filled..])?;
        if read == 0 {
            if filled == 0 {
                return Ok(Received::PeerClosed);
            }
            return Err(ChannelError::UnexpectedEof {
                expected: n,
                received: filled,
            });
        }
        filled += read;
    }
    Ok(Received::Data(buf.freeze()))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use super::*;

    fn fast_config() -> ChannelConfig {
        ChannelConfig {
            read: RetryPolicy::new(3, Duration::from_millis(1)),
            write: RetryPolicy::new(3, Duration::from_millis(1)),
            ..ChannelConfig::default()
        }
    }

    #[test]
    #[cfg(unix)]
    fn send_and_recv_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut a = StreamChannel::new(left.try_clone().unwrap(), left);
        let mut b = StreamChannel::new(right.try_clone().unwrap(), right);

        a.send(b"hello").unwrap();
        let got = b.recv(5).unwrap();
        assert_eq!(got, Received::Data(bytes::Bytes::from_static(b"hello")));
    }

    #[test]
    fn recv_zero_bytes_is_empty_data() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::<u8>::new()), Vec::<u8>::new());
        assert_eq!(channel.recv(0).unwrap(), Received::Data(bytes::Bytes::new()));
    }

    #[test]
    fn eof_before_first_byte_is_peer_closed() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::<u8>::new()), Vec::<u8>::new());
        assert_eq!(channel.recv(4).unwrap(), Received::PeerClosed);
    }

    #[test]
    fn eof_mid_read_is_unexpected_eof() {
        let mut channel = StreamChannel::new(Cursor::new(vec![1u8, 2]), Vec::<u8>::new());
        let err = channel.recv(4).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::UnexpectedEof {
                expected: 4,
                received: 2
            }
        ));
    }

    #[test]
    fn partial_reads_are_assembled() {
        let reader = ByteByByteReader {
            bytes: b"slowly".to_vec(),
            pos: 0,
        };
        let mut channel = StreamChannel::new(reader, Vec::<u8>::new());
        let got = channel.recv(6).unwrap().into_data().unwrap();
        assert_eq!(got.as_ref(), b"slowly");
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::<u8>::new()), OneByteWriter::default());
        channel.send(b"abcdef").unwrap();
        let (_, writer) = channel.into_parts().unwrap();
        assert_eq!(writer.data, b"abcdef");
    }

    #[test]
    fn would_block_write_is_retried() {
        let writer = WouldBlockWriter {
            stalls_left: 2,
            data: Vec::new(),
        };
        let mut channel = StreamChannel::with_config(Cursor::new(Vec::<u8>::new()), writer, fast_config());
        channel.send(b"retry").unwrap();
        let (_, writer) = channel.into_parts().unwrap();
        assert_eq!(writer.data, b"retry");
    }

    #[test]
    fn stalled_write_times_out() {
        let writer = WouldBlockWriter {
            stalls_left: usize::MAX,
            data: Vec::new(),
        };
        let mut channel = StreamChannel::with_config(Cursor::new(Vec::<u8>::new()), writer, fast_config());
        let err = channel.send(b"never").unwrap_err();
        assert!(matches!(err, ChannelError::WriteTimeout { attempts: 3, .. }));
    }

    #[test]
    fn draining_peer_never_exhausts_write_budget() {
        // The policy tolerates two stalls in a row; the writer stalls twice before every chunk.
        let writer = TrickleWriter {
            chunk: 4,
            stalls_per_chunk: 2,
            stalled: 0,
            data: Vec::new(),
        };
        let mut channel = StreamChannel::with_config(Cursor::new(Vec::<u8>::new()), writer, fast_config());
        let payload: Vec<u8> = (0..=255).collect();
        channel.send(&payload).unwrap();
        let (_, writer) = channel.into_parts().unwrap();
        assert_eq!(writer.data, payload);
    }

    #[test]
    fn cancelled_channel_rejects_io() {
        let config = fast_config();
        config.cancel.cancel();
        let mut channel = StreamChannel::with_config(Cursor::new(vec![1u8, 2, 3]), Vec::<u8>::new(), config);
        assert!(matches!(channel.send(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(channel.recv(1), Err(ChannelError::Closed)));
    }

    #[test]
    fn stalled_read_times_out() {
        let mut channel =
            StreamChannel::with_config(AlwaysWouldBlock, Vec::<u8>::new(), fast_config());
        let err = channel.recv(1).unwrap_err();
        assert!(matches!(err, ChannelError::ReadTimeout { attempts: 3, .. }));
    }

    #[test]
    fn close_is_idempotent_and_rejects_io() {
        let mut channel = StreamChannel::new(Cursor::new(vec![1u8, 2, 3]), Vec::<u8>::new());
        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(channel.send(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(channel.recv(1), Err(ChannelError::Closed)));
        assert!(matches!(channel.open(), Err(ChannelError::Closed)));
    }

    #[test]
    fn write_zero_is_an_error() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::<u8>::new()), ZeroWriter);
        let err = channel.send(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct AlwaysWouldBlock;

    impl Read for AlwaysWouldBlock {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(ErrorKind::WouldBlock))
        }
    }

    #[derive(Default)]
    struct OneByteWriter {
        data: Vec<u8>,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match buf.first() {
                Some(b) => {
                    self.data.push(*b);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct WouldBlockWriter {
        stalls_left: usize,
        data: Vec<u8>,
    }

    impl Write for WouldBlockWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalls_left > 0 {
                self.stalls_left -= 1;
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts `chunk` bytes at a time after `stalls_per_chunk` would-blocks.
    struct TrickleWriter {
        chunk: usize,
        stalls_per_chunk: usize,
        stalled: usize,
        data: Vec<u8>,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalled < self.stalls_per_chunk {
                self.stalled += 1;
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            self.stalled = 0;
            let n = buf.len().min(self.chunk);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
