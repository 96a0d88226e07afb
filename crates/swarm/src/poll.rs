//! # Cancellable Polling
//!
//! Fixed-interval polling with an optional deadline, an optional attempt
//! limit and a cancellation signal.
//!
//! ```text
//!   probe ──▶ Ready(T) ─────────────────────────────▶ PollOutcome::Ready
//!     │
//!     ├──▶ Err(e) ──────────────────────────────────▶ Err(e)  (no retry)
//!     │
//!     └──▶ pending ──▶ limit/deadline hit? ── yes ──▶ PollOutcome::TimedOut
//!                           │ no
//!                      sleep(interval) ── cancelled ─▶ PollOutcome::Cancelled
//!                           │
//!                           └──▶ probe again
//! ```
//!
//! The sleep is a condvar wait, so [`CancelToken::cancel`] wakes a sleeping
//! poller immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Default fixed poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shared cancellation state.
#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

/// Cancels every poll loop holding a clone of it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelSignal>,
}

impl CancelToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the token and wakes every waiter.
    pub fn cancel(&self) {
        let _guard = self.inner.mutex.lock();
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
    }

    /// Returns true once [`CancelToken::cancel`] was called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps for up to `timeout`. Returns true if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.mutex.lock();
        while !self.is_cancelled() {
            if self.inner.condvar.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }
}

/// When to give up polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two probes.
    pub interval: Duration,
    /// Total time budget, measured from the first probe.
    pub timeout: Option<Duration>,
    /// Maximum probes.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_attempts: None,
        }
    }
}

/// How a poll loop ended, when no probe failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A probe produced a value.
    Ready(T),
    /// The deadline or attempt limit was reached.
    TimedOut {
        /// Probes issued.
        attempts: u32,
    },
    /// The cancel token fired.
    Cancelled,
}

/// Runs probes according to a [`PollPolicy`].
#[derive(Clone, Debug, Default)]
pub struct Poller {
    policy: PollPolicy,
    cancel: CancelToken,
}

impl Poller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(policy: PollPolicy, cancel: CancelToken) -> Self {
        Self { policy, cancel }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Returns the cancel token.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Probes until `probe` yields a value, fails, or the policy gives up.
    ///
    /// The first probe runs immediately. A probe error ends the loop at once
    /// and is returned as is.
    pub fn poll<T, E, F>(&self, mut probe: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        // A timeout past the end of the clock means no deadline
        let deadline = self.policy.timeout.and_then(|t| Instant::now().checked_add(t));
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }

            attempts = attempts.saturating_add(1);
            if let Some(value) = probe()? {
                return Ok(PollOutcome::Ready(value));
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Ok(PollOutcome::TimedOut { attempts });
            }

            let mut pause = self.policy.interval;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(PollOutcome::TimedOut { attempts });
                }
                pause = pause.min(remaining);
            }

            if self.cancel.wait_timeout(pause) {
                return Ok(PollOutcome::Cancelled);
            }
        }
    }
}
