//! # Completion Engine
//!
//! The contract between sessions and whatever executes their I/O.
//!
//! ## Model
//!
//! ```text
//!   Session                     Engine                    Worker thread
//!      │  post_receive(h, n)      │                            │
//!      │─────────────────────────▶│  queue operation           │
//!      │                          │───────────────────────────▶│ read(...)
//!      │                          │                            │
//!      │◀──────────────────────── recv_completion(bytes) ──────│
//! ```
//!
//! Posting never blocks. Completions arrive later on an engine thread, in
//! parallel across sessions. A posted operation that was accepted MUST be
//! completed exactly once; a rejected post MUST NOT be completed.

mod runtime;

pub use runtime::{EngineConfig, TcpHandle, TokioEngine};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::SessionResult;
use crate::session::DisconnectReason;

/// Receives completions for operations posted on behalf of one session.
pub trait CompletionSink<H>: Send + Sync {
    /// A posted connect finished.
    fn connect_completion(&self, result: io::Result<H>);

    /// A posted receive finished. `Ok` with an empty vector means the peer
    /// closed the connection.
    fn recv_completion(&self, result: io::Result<Vec<u8>>);

    /// A posted send finished with the number of bytes transferred.
    fn send_completion(&self, result: io::Result<usize>);

    /// A posted disconnect finished; the handle has been torn down.
    fn disconnect_completion(&self, reason: DisconnectReason);
}

/// Executes posted I/O operations and reports them to a [`CompletionSink`].
pub trait CompletionEngine: Send + Sync + 'static {
    /// Connection handle type owned by a session.
    type Handle: Clone + Send + Sync + 'static;

    /// Opens a connection to `addr`.
    fn post_connect(
        &self,
        addr: SocketAddr,
        sink: Arc<dyn CompletionSink<Self::Handle>>,
    ) -> SessionResult<()>;

    /// Reads at most `max_len` bytes from `handle`.
    fn post_receive(
        &self,
        handle: &Self::Handle,
        max_len: usize,
        sink: Arc<dyn CompletionSink<Self::Handle>>,
    ) -> SessionResult<()>;

    /// Writes all of `data` to `handle`.
    fn post_send(
        &self,
        handle: &Self::Handle,
        data: Vec<u8>,
        sink: Arc<dyn CompletionSink<Self::Handle>>,
    ) -> SessionResult<()>;

    /// Tears down `handle`. Any outstanding receive on it is aborted.
    fn post_disconnect(
        &self,
        handle: Self::Handle,
        reason: DisconnectReason,
        sink: Arc<dyn CompletionSink<Self::Handle>>,
    ) -> SessionResult<()>;
}
