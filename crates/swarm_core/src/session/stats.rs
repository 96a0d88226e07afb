//! Per-session traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free traffic counters, updated from completion threads.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Bytes acknowledged by send completions.
    bytes_sent: AtomicU64,
    /// Bytes stored by receive completions.
    bytes_received: AtomicU64,
    /// Completed sends.
    sends_completed: AtomicU64,
    /// Completed non-empty receives.
    recvs_completed: AtomicU64,
}

impl SessionStats {
    pub(crate) fn record_send(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.sends_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recv(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.recvs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current values.
    #[must_use]
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            sends_completed: self.sends_completed.load(Ordering::Relaxed),
            recvs_completed: self.recvs_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Sends completed.
    pub sends_completed: u64,
    /// Receives completed.
    pub recvs_completed: u64,
}

impl SessionStatsSnapshot {
    /// Adds `other` into `self`.
    pub fn accumulate(&mut self, other: &Self) {
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.sends_completed += other.sends_completed;
        self.recvs_completed += other.recvs_completed;
    }
}
