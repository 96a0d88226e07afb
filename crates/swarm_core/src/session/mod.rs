//! # Session
//!
//! A duplex connection wrapped with buffered asynchronous send/receive and a
//! reference-counted lifetime.
//!
//! ## Lifecycle
//!
//! ```text
//!  Created ──bind + first recv──▶ Connected ──disconnect_request──▶ Disconnecting
//!                                                                       │
//!                                     disconnect_completion ◀───────────┘
//!                                              │
//!                                              ▼
//!                                        Disconnected
//! ```
//!
//! ## Ownership
//!
//! The application and every in-flight operation co-own a session. Each
//! posted receive, send, connect and disconnect holds one logical reference
//! which its completion releases. When the count drops to zero the handler's
//! `on_release` fires exactly once; storage is freed with the last `Arc`.
//!
//! ## Locking
//!
//! The send buffer lock is a leaf: nothing else is locked while it is held,
//! and it is never held across a call into the engine or the handler.

mod handler;
mod stats;

pub use handler::SessionHandler;
pub use stats::{SessionStats, SessionStatsSnapshot};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::buffer::RingBuffer;
use crate::engine::{CompletionEngine, CompletionSink};
use crate::error::{SessionError, SessionResult};

/// Why a session was (or is being) disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectReason {
    /// The application asked for it.
    Active = 0,
    /// The peer closed the connection (zero-byte receive).
    RecvZero = 1,
    /// The connect attempt failed.
    ConnectError = 2,
    /// The engine rejected a posted operation.
    IoRequestError = 3,
    /// The engine reported an I/O error for a completed operation.
    CompletionError = 4,
    /// Outbound data could not be buffered.
    SendBufferError = 5,
    /// Inbound data arrived with no room left to store it.
    RecvBufferFull = 6,
}

impl DisconnectReason {
    /// Returns true if the peer initiated the disconnect.
    #[must_use]
    pub const fn is_peer_close(self) -> bool {
        matches!(self, Self::RecvZero)
    }

    /// Returns true if the application initiated the disconnect.
    #[must_use]
    pub const fn is_requested(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if a local error caused the disconnect.
    #[must_use]
    pub const fn is_local_error(self) -> bool {
        !self.is_peer_close() && !self.is_requested()
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::RecvZero => "peer closed",
            Self::ConnectError => "connect error",
            Self::IoRequestError => "io request error",
            Self::CompletionError => "completion error",
            Self::SendBufferError => "send buffer error",
            Self::RecvBufferFull => "receive buffer full",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Constructed, no handle bound yet.
    Created = 0,
    /// Connect posted, waiting for its completion.
    Connecting = 1,
    /// Handle bound and a receive is armed.
    Connected = 2,
    /// Teardown posted, waiting for its completion.
    Disconnecting = 3,
    /// Teardown finished.
    Disconnected = 4,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Created
    }
}

/// Outbound state guarded by the send lock.
struct SendState {
    /// Buffered bytes, oldest first. Bytes of the in-flight send stay here
    /// until its completion consumes them.
    buffer: RingBuffer,
    /// Number of sends posted and not yet completed (0 or 1).
    requested: usize,
}

/// A completion-driven session.
///
/// `H` receives read/connect/disconnect/release notifications, `E` executes
/// the I/O.
pub struct Session<H: SessionHandler, E: CompletionEngine> {
    /// I/O executor.
    engine: Arc<E>,
    /// Notification target.
    handler: H,
    /// Bound connection handle, exclusively owned.
    handle: Mutex<Option<E::Handle>>,
    /// Inbound bytes not yet consumed by the handler.
    recv_buffer: Mutex<RingBuffer>,
    /// Outbound bytes and outstanding send count.
    send: Mutex<SendState>,
    /// Logical reference count.
    ref_count: AtomicUsize,
    /// Set when `on_release` has fired.
    released: AtomicBool,
    /// Connected flag; its true→false transition guards teardown.
    connected: AtomicBool,
    /// Current [`SessionState`].
    state: AtomicU8,
    /// Traffic counters.
    stats: SessionStats,
    /// Handed to the engine as the completion sink.
    self_ref: Weak<Self>,
}

impl<H: SessionHandler, E: CompletionEngine> Session<H, E> {
    /// Creates a session with the given buffer sizes.
    ///
    /// # Panics
    ///
    /// Panics if either buffer size is zero.
    #[must_use]
    pub fn new(engine: Arc<E>, handler: H, send_buf_size: usize, recv_buf_size: usize) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            engine,
            handler,
            handle: Mutex::new(None),
            recv_buffer: Mutex::new(RingBuffer::new(recv_buf_size)),
            send: Mutex::new(SendState {
                buffer: RingBuffer::new(send_buf_size),
                requested: 0,
            }),
            ref_count: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Created as u8),
            stats: SessionStats::default(),
            self_ref: self_ref.clone(),
        })
    }

    /// Returns the notification handler.
    #[inline]
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the completion engine.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Returns true while the session is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the current logical reference count.
    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Returns true once `on_release` has fired.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the traffic counters.
    #[must_use]
    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the number of sends posted and not yet completed.
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.send.lock().requested
    }

    /// Returns the number of bytes waiting in the send buffer.
    #[must_use]
    pub fn buffered_send_bytes(&self) -> usize {
        self.send.lock().buffer.used_space()
    }

    /// Returns the number of received bytes not yet consumed.
    #[must_use]
    pub fn buffered_recv_bytes(&self) -> usize {
        self.recv_buffer.lock().used_space()
    }

    /// Removes and returns up to `max_len` received bytes.
    #[must_use]
    pub fn read_received(&self, max_len: usize) -> Vec<u8> {
        self.recv_buffer.lock().read(max_len)
    }

    /// Copies up to `max_len` received bytes without consuming them.
    #[must_use]
    pub fn peek_received(&self, max_len: usize) -> Vec<u8> {
        self.recv_buffer.lock().peek(max_len)
    }

    /// Discards up to `len` received bytes.
    pub fn consume_received(&self, len: usize) -> usize {
        self.recv_buffer.lock().consume(len)
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    /// Adds a logical reference and returns the new count.
    pub fn add_ref(&self) -> usize {
        let count = self.ref_count.fetch_add(1, Ordering::AcqRel) + 1;
        if self.is_released() {
            tracing::warn!(count, "add_ref on a released session");
        }
        count
    }

    /// Drops a logical reference and returns the new count.
    ///
    /// The count never goes below zero; an extra release is logged and
    /// ignored. Reaching zero fires `on_release` once per session.
    pub fn release_ref(&self) -> usize {
        let previous = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));

        match previous {
            Ok(1) => {
                if !self.released.swap(true, Ordering::AcqRel) {
                    self.handler.on_release(self);
                }
                0
            }
            Ok(count) => count - 1,
            Err(_) => {
                tracing::warn!("release_ref on a session with no references");
                0
            }
        }
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Posts a connect to `addr`.
    ///
    /// On completion the handle is bound, the first receive is armed and the
    /// handler's `on_connect` fires. Only a `Created` or `Disconnected`
    /// session can connect; a second connect while one is pending fails.
    pub fn connect(&self, addr: SocketAddr) -> SessionResult<()> {
        let claimed = [SessionState::Created, SessionState::Disconnected]
            .into_iter()
            .any(|from| {
                self.state
                    .compare_exchange(
                        from as u8,
                        SessionState::Connecting as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            });
        if !claimed {
            return Err(SessionError::io_post(
                "connect",
                format!("session is {:?}", self.state()),
            ));
        }

        self.add_ref();
        if let Err(e) = self.engine.post_connect(addr, self.sink()?) {
            self.set_state(SessionState::Created);
            self.release_ref();
            return Err(e);
        }
        Ok(())
    }

    /// Binds an already-open handle and arms the first receive.
    pub fn bind(&self, handle: E::Handle) -> SessionResult<()> {
        {
            let mut slot = self.handle.lock();
            if slot.is_some() {
                return Err(SessionError::io_post("bind", "a handle is already bound"));
            }
            *slot = Some(handle);
        }

        self.connected.store(true, Ordering::Release);
        self.set_state(SessionState::Connected);

        if let Err(e) = self.post_receive() {
            self.disconnect_request(DisconnectReason::IoRequestError);
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Arms the engine to deliver the next inbound data.
    pub fn post_receive(&self) -> SessionResult<()> {
        let handle = self.bound_handle("receive")?;
        let free = self.recv_buffer.lock().free_space();
        if free == 0 {
            return Err(SessionError::io_post("receive", "receive buffer full"));
        }

        self.add_ref();
        if let Err(e) = self.engine.post_receive(&handle, free, self.sink()?) {
            self.release_ref();
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Queues `data` and starts a send if none is outstanding.
    ///
    /// `data` is queued whole or not at all.
    pub fn post_send(&self, data: &[u8]) -> SessionResult<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        {
            let mut send = self.send.lock();
            let available = send.buffer.free_space();
            if available < data.len() {
                return Err(SessionError::SendBufferFull {
                    requested: data.len(),
                    available,
                });
            }
            send.buffer.write(data);
        }

        self.flush_send().map(|_| ())
    }

    /// Submits buffered bytes as one send.
    ///
    /// Returns `Ok(false)` if nothing is buffered or a send is already in
    /// flight.
    pub fn flush_send(&self) -> SessionResult<bool> {
        if !self.is_connected() {
            return Ok(false);
        }

        let data = {
            let mut send = self.send.lock();
            if send.requested > 0 || send.buffer.is_empty() {
                return Ok(false);
            }
            send.requested += 1;
            send.buffer.peek(send.buffer.used_space())
        };

        let posted = self
            .bound_handle("send")
            .and_then(|handle| {
                self.add_ref();
                self.sink()
                    .and_then(|sink| self.engine.post_send(&handle, data, sink))
                    .map_err(|e| {
                        self.release_ref();
                        e
                    })
            });

        match posted {
            Ok(()) => Ok(true),
            Err(e) => {
                self.send.lock().requested -= 1;
                self.disconnect_request(DisconnectReason::IoRequestError);
                Err(e)
            }
        }
    }

    /// Sends everything currently held in the receive buffer back to the peer.
    pub fn echo_back(&self) -> SessionResult<usize> {
        let data = {
            let mut recv = self.recv_buffer.lock();
            let used = recv.used_space();
            recv.read(used)
        };
        if data.is_empty() {
            return Ok(0);
        }

        self.post_send(&data).map(|()| data.len())
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Starts teardown. Only the first call has any effect; it returns true.
    pub fn disconnect_request(&self, reason: DisconnectReason) -> bool {
        if self
            .connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.set_state(SessionState::Disconnecting);
        tracing::debug!(%reason, "disconnect requested");

        // Released by disconnect_completion
        self.add_ref();

        let taken = self.handle.lock().take();
        let Some(handle) = taken else {
            self.disconnect_completion(reason);
            return true;
        };

        let posted = self
            .sink()
            .and_then(|sink| self.engine.post_disconnect(handle, reason, sink));
        if let Err(e) = posted {
            // Handle is dropped; finish teardown locally
            tracing::warn!(error = %e, "disconnect post rejected");
            self.disconnect_completion(reason);
        }
        true
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn bound_handle(&self, operation: &'static str) -> SessionResult<E::Handle> {
        self.handle
            .lock()
            .clone()
            .ok_or_else(|| SessionError::io_post(operation, "no handle bound"))
    }

    fn sink(&self) -> SessionResult<Arc<dyn CompletionSink<E::Handle>>> {
        let this: Arc<dyn CompletionSink<E::Handle>> = self
            .self_ref
            .upgrade()
            .ok_or_else(|| SessionError::io_post("completion", "session dropped"))?;
        Ok(this)
    }
}

impl<H: SessionHandler, E: CompletionEngine> CompletionSink<E::Handle> for Session<H, E> {
    fn connect_completion(&self, result: io::Result<E::Handle>) {
        match result {
            Ok(handle) => {
                if self.bind(handle).is_ok() {
                    self.handler.on_connect(self);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.set_state(SessionState::Disconnected);
                self.handler.on_disconnect(self, DisconnectReason::ConnectError);
            }
        }
        self.release_ref();
    }

    fn recv_completion(&self, result: io::Result<Vec<u8>>) {
        match result {
            Err(e) => {
                if self.is_connected() {
                    tracing::debug!(error = %e, "receive failed");
                }
                self.disconnect_request(DisconnectReason::CompletionError);
            }
            Ok(data) if data.is_empty() => {
                self.disconnect_request(DisconnectReason::RecvZero);
            }
            Ok(data) => {
                let written = self.recv_buffer.lock().write(&data);
                self.stats.record_recv(written);

                if written < data.len() {
                    self.disconnect_request(DisconnectReason::RecvBufferFull);
                } else {
                    self.handler.on_read(self, written);

                    if self.is_connected() && self.post_receive().is_err() {
                        self.disconnect_request(DisconnectReason::IoRequestError);
                    }
                }
            }
        }
        self.release_ref();
    }

    fn send_completion(&self, result: io::Result<usize>) {
        match result {
            Ok(transferred) => {
                {
                    let mut send = self.send.lock();
                    send.buffer.consume(transferred);
                    send.requested -= 1;
                }
                self.stats.record_send(transferred);

                if let Err(e) = self.flush_send() {
                    tracing::debug!(error = %e, "follow-up send failed");
                }
            }
            Err(e) => {
                self.send.lock().requested -= 1;
                if self.is_connected() {
                    tracing::debug!(error = %e, "send failed");
                }
                self.disconnect_request(DisconnectReason::CompletionError);
            }
        }
        self.release_ref();
    }

    fn disconnect_completion(&self, reason: DisconnectReason) {
        self.set_state(SessionState::Disconnected);
        self.handler.on_disconnect(self, reason);
        self.release_ref();
    }
}

impl<H: SessionHandler, E: CompletionEngine> std::fmt::Debug for Session<H, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
