use std::io::{self, ErrorKind};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::cancel::CancelToken;
use crate::error::ChannelError;

/// Bounded retry with a fixed sleep between attempts.
///
/// The total wall-clock budget of a policy is `max_attempts × interval`.
/// Only failures accepted by the caller's predicate consume budget;
/// `Interrupted` is retried immediately and everything else is fatal.
/// A success ends the run, so callers that make progress in steps get a
/// fresh budget per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of transient failures tolerated before giving up.
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub interval: Duration,
}

/// Why a retried operation stopped without succeeding.
#[derive(Debug)]
pub enum RetryError {
    /// The transient condition persisted for the whole budget.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: io::Error,
    },
    /// A non-transient error ended the loop.
    Fatal(io::Error),
    /// The cancel token fired.
    Cancelled,
}

impl RetryPolicy {
    /// Waiting for the peer to attach to a named pipe: 500 × 200 ms.
    pub const CONNECT: RetryPolicy = RetryPolicy::new(500, Duration::from_millis(200));

    /// Waiting out a full pipe or an empty non-blocking read: 500 × 100 ms.
    pub const IO: RetryPolicy = RetryPolicy::new(500, Duration::from_millis(100));

    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails fatally, or the budget runs out.
    pub fn run<T>(
        &self,
        op: impl FnMut() -> io::Result<T>,
        is_transient: impl Fn(&io::Error) -> bool,
    ) -> Result<T, RetryError> {
        self.run_with(&CancelToken::new(), op, is_transient, std::thread::sleep)
    }

    /// Like [`run`](Self::run), but stops with [`RetryError::Cancelled`] once
    /// `cancel` fires, including in the middle of a sleep.
    pub fn run_cancellable<T>(
        &self,
        cancel: &CancelToken,
        op: impl FnMut() -> io::Result<T>,
        is_transient: impl Fn(&io::Error) -> bool,
    ) -> Result<T, RetryError> {
        self.run_with(cancel, op, is_transient, |interval| {
            cancel.sleep(interval);
        })
    }

    /// The general form: `pause` replaces the fixed sleep between attempts.
    ///
    /// `pause` receives the policy interval and may return early, for
    /// instance when a descriptor becomes ready.
    pub fn run_with<T>(
        &self,
        cancel: &CancelToken,
        mut op: impl FnMut() -> io::Result<T>,
        is_transient: impl Fn(&io::Error) -> bool,
        mut pause: impl FnMut(Duration),
    ) -> Result<T, RetryError> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_transient(&err) => {
                    attempts = attempts.saturating_add(1);
                    if attempts >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts,
                            elapsed: started.elapsed(),
                            last: err,
                        });
                    }
                    trace!(attempts, error = %err, "transient failure, retrying");
                    pause(self.interval);
                }
                Err(err) => return Err(RetryError::Fatal(err)),
            }
        }
    }
}

impl RetryError {
    /// Map to the read-phase channel error.
    pub(crate) fn into_read_error(self) -> ChannelError {
        match self {
            RetryError::Exhausted {
                attempts, elapsed, ..
            } => ChannelError::ReadTimeout { attempts, elapsed },
            RetryError::Fatal(err) => ChannelError::Io(err),
            RetryError::Cancelled => ChannelError::Closed,
        }
    }

    /// Map to the write-phase channel error.
    pub(crate) fn into_write_error(self) -> ChannelError {
        match self {
            RetryError::Exhausted {
                attempts, elapsed, ..
            } => ChannelError::WriteTimeout { attempts, elapsed },
            RetryError::Fatal(err) => ChannelError::Io(err),
            RetryError::Cancelled => ChannelError::Closed,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::IO
    }
}

/// Transient predicate for non-blocking reads and writes.
pub fn would_block(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
}
