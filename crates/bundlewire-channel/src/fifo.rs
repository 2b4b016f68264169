use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::error::{ChannelError, Result};
use crate::retry::{would_block, RetryError, RetryPolicy};
use crate::stream::{read_exact_or_closed, write_all_with};
use crate::traits::{Channel, ChannelConfig, Received};

/// Conventional name of the pipe the helper reads from.
pub const DEFAULT_INBOUND: &str = ".to.fifo";
/// Conventional name of the pipe the helper writes to.
pub const DEFAULT_OUTBOUND: &str = ".from.fifo";

/// The two named pipes of one side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoPaths {
    /// Opened read-only by this side.
    pub inbound: PathBuf,
    /// Opened write-only by this side.
    pub outbound: PathBuf,
}

impl FifoPaths {
    pub fn new(inbound: impl Into<PathBuf>, outbound: impl Into<PathBuf>) -> Self {
        Self {
            inbound: inbound.into(),
            outbound: outbound.into(),
        }
    }

    /// The conventional pipe names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(DEFAULT_INBOUND), dir.join(DEFAULT_OUTBOUND))
    }

    /// The same pipes seen from the other side.
    pub fn swapped(&self) -> Self {
        Self {
            inbound: self.outbound.clone(),
            outbound: self.inbound.clone(),
        }
    }
}

impl Default for FifoPaths {
    fn default() -> Self {
        Self::new(DEFAULT_INBOUND, DEFAULT_OUTBOUND)
    }
}

/// Channel over a pair of pre-existing named pipes.
///
/// Both descriptors are non-blocking. `open` waits for the peer to attach
/// to the outbound pipe, `recv` waits for read-readiness with `poll(2)` and
/// a stalled `send` waits for write-readiness. Every wait notices the
/// config's [`CancelToken`] within [`CancelToken::CHECK_INTERVAL`].
pub struct FifoChannel {
    paths: FifoPaths,
    config: ChannelConfig,
    reader: Option<File>,
    writer: Option<File>,
}

impl FifoChannel {
    pub fn new(paths: FifoPaths) -> Self {
        Self::with_config(paths, ChannelConfig::default())
    }

    pub fn with_config(paths: FifoPaths, config: ChannelConfig) -> Self {
        Self {
            paths,
            config,
            reader: None,
            writer: None,
        }
    }

    pub fn paths(&self) -> &FifoPaths {
        &self.paths
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Handle that closes this channel from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.config.cancel.clone()
    }
}

impl Channel for FifoChannel {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        ensure_fifo(&self.paths.inbound)?;
        ensure_fifo(&self.paths.outbound)?;

        // A non-blocking read open succeeds without a writer; doing it first
        // lets the peer's write open go through while we wait on ours.
        let reader = open_nonblocking(&self.paths.inbound, false)?;
        let writer = connect_writer(&self.paths.outbound, &self.config.connect, &self.config.cancel)?;

        debug!(
            inbound = ?self.paths.inbound,
            outbound = ?self.paths.outbound,
            "named pipe channel open"
        );
        self.reader = Some(reader);
        self.writer = Some(writer);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut writer: &File = self.writer.as_ref().ok_or(ChannelError::Closed)?;
        let fd = writer.as_raw_fd();
        let cancel = &self.config.cancel;
        write_all_with(&mut writer, bytes, &self.config.write, cancel, |interval| {
            // Returns as soon as the reader drains some of the pipe.
            let _ = wait_ready(fd, libc::POLLOUT, interval, cancel);
        })
    }

    fn recv(&mut self, n: usize) -> Result<Received> {
        let mut reader: &File = self.reader.as_ref().ok_or(ChannelError::Closed)?;
        let fd = reader.as_raw_fd();
        let config = &self.config;
        read_exact_or_closed(n, |buf| {
            if !wait_ready(fd, libc::POLLIN, config.poll_timeout, &config.cancel)? {
                return Err(ChannelError::NoResponse {
                    timeout: config.poll_timeout,
                });
            }
            config
                .read
                .run_cancellable(&config.cancel, || reader.read(buf), would_block)
                .map_err(|err| err.into_read_error())
        })
    }

    fn close(&mut self) {
        let had_reader = self.reader.take().is_some();
        let had_writer = self.writer.take().is_some();
        if had_reader || had_writer {
            debug!(inbound = ?self.paths.inbound, "named pipe channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some() && self.writer.is_some()
    }

    fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

impl Drop for FifoChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FifoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoChannel")
            .field("paths", &self.paths)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Fail with [`ChannelError::NotAPipe`] unless `path` is an existing FIFO.
pub fn ensure_fifo(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(ChannelError::NotAPipe {
            path: path.to_path_buf(),
        }),
        Err(err) => {
            debug!(?path, error = %err, "cannot stat pipe path");
            Err(ChannelError::NotAPipe {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Create a named pipe at `path` with the given permission bits.
pub fn create_fifo(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| ChannelError::Create {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        return Err(ChannelError::Create {
            path: path.to_path_buf(),
            source: io::Error::last_os_error(),
        });
    }
    debug!(?path, "created named pipe");
    Ok(())
}

fn open_nonblocking(path: &Path, write: bool) -> io::Result<File> {
    OpenOptions::new()
        .read(!write)
        .write(write)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// `ENXIO` on a non-blocking write open means nobody has the read end yet.
fn peer_absent(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENXIO)
}

fn connect_writer(path: &Path, policy: &RetryPolicy, cancel: &CancelToken) -> Result<File> {
    let mut waiting = false;
    let result = policy.run_cancellable(
        cancel,
        || {
            let opened = open_nonblocking(path, true);
            if let Err(err) = &opened {
                if peer_absent(err) && !waiting {
                    waiting = true;
                    info!(?path, "waiting for peer to attach");
                }
            }
            opened
        },
        peer_absent,
    );

    match result {
        Ok(file) => {
            if waiting {
                info!(?path, "peer attached");
            }
            Ok(file)
        }
        Err(RetryError::Exhausted {
            attempts, elapsed, ..
        }) => {
            warn!(?path, attempts, ?elapsed, "peer never attached");
            Err(ChannelError::PeerNotConnected {
                path: path.to_path_buf(),
                attempts,
            })
        }
        Err(RetryError::Fatal(err)) => Err(ChannelError::Io(err)),
        Err(RetryError::Cancelled) => {
            debug!(?path, "connect cancelled");
            Err(ChannelError::Closed)
        }
    }
}

/// Block until `fd` reports one of `events`, a hang-up or an error.
///
/// Returns `Ok(false)` once `timeout` passes with no event. The descriptor is
/// polled in slices of at most [`CancelToken::CHECK_INTERVAL`]; a fired
/// token ends the wait with [`ChannelError::Closed`].
fn wait_ready(
    fd: RawFd,
    events: libc::c_short,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<bool> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(false);
                }
                left.min(CancelToken::CHECK_INTERVAL)
            }
            None => CancelToken::CHECK_INTERVAL,
        };
        // Bounded by CHECK_INTERVAL, so it fits a c_int.
        let millis = slice.as_millis().max(1) as libc::c_int;
        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and the count is exactly one.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ChannelError::Io(err));
        }
        if rc == 0 {
            continue;
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(ChannelError::Closed);
        }
        if pfd.revents & events == 0 && pfd.revents & libc::POLLHUP != 0 {
            trace!(fd, "peer hung up");
        }
        // Readiness, hang-up and error all make the next read or write return promptly.
        return Ok(true);
    }
}

/// Owner of a freshly created pipe pair.
///
/// Pipes this value created are removed on drop, unless the path was
/// replaced in the meantime. Pre-existing pipes are reused and left alone.
pub struct FifoPair {
    paths: FifoPaths,
    created: Vec<(PathBuf, u64, u64)>,
}

impl FifoPair {
    /// Default permission mode for created pipes.
    pub const DEFAULT_MODE: u32 = 0o600;

    /// Create `.to.fifo` and `.from.fifo` inside `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_mode(FifoPaths::in_dir(dir), Self::DEFAULT_MODE)
    }

    /// Create both pipes of `paths` with explicit mode.
    pub fn create_with_mode(paths: FifoPaths, mode: u32) -> Result<Self> {
        let mut pair = Self {
            paths: paths.clone(),
            created: Vec::with_capacity(2),
        };

        for path in [&paths.inbound, &paths.outbound] {
            match std::fs::symlink_metadata(path) {
                Ok(metadata) if metadata.file_type().is_fifo() => {
                    debug!(?path, "reusing existing named pipe");
                    continue;
                }
                Ok(_) => return Err(ChannelError::NotAPipe { path: path.clone() }),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(ChannelError::Create {
                        path: path.clone(),
                        source: err,
                    })
                }
            }

            create_fifo(path, mode)?;
            let metadata = std::fs::symlink_metadata(path).map_err(|err| ChannelError::Create {
                path: path.clone(),
                source: err,
            })?;
            pair.created.push((path.clone(), metadata.dev(), metadata.ino()));
        }

        Ok(pair)
    }

    /// Paths from the helper's side (reads `.to.fifo`, writes `.from.fifo`).
    pub fn paths(&self) -> &FifoPaths {
        &self.paths
    }

    /// Paths from the parent's side.
    pub fn peer_paths(&self) -> FifoPaths {
        self.paths.swapped()
    }

    /// Keep the pipes on disk after this value is dropped.
    pub fn persist(mut self) -> FifoPaths {
        self.created.clear();
        self.paths.clone()
    }
}

impl Drop for FifoPair {
    fn drop(&mut self) {
        for (path, expected_dev, expected_ino) in self.created.drain(..) {
            if let Ok(metadata) = std::fs::symlink_metadata(&path) {
                if metadata.file_type().is_fifo()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(?path, "removing named pipe");
                    let _ = std::fs::remove_file(&path);
                } else {
                    debug!(?path, "pipe path identity changed; skipping cleanup");
                }
            }
        }
    }
}

impl std::fmt::Debug for FifoPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoPair")
            .field("paths", &self.paths)
            .field("owned", &self.created.len())
            .finish()
    }
}
