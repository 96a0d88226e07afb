//! # SWARM Core - Session I/O Engine
//!
//! Buffered, reference-counted sessions over duplex byte streams, driven by
//! I/O completions.
//!
//! ## Architecture
//!
//! - **RingBuffer**: fixed-capacity wrap-around byte store (send + receive)
//! - **Session**: one connection handle, two ring buffers, a reference count
//!   and a single-shot disconnect protocol
//! - **CompletionEngine**: executes posted operations and reports completions
//! - **TokioEngine**: completion engine on a multi-threaded tokio runtime
//!
//! ## Execution Model
//!
//! ```text
//!   Application thread          Engine worker threads
//!          │                              │
//!   post_send ──▶ [send ring] ──▶ post ──▶│ write ──▶ send_completion
//!                                         │
//!          [recv ring] ◀── recv_completion│◀── read
//!               │                         │
//!            on_read ──▶ post_receive ───▶│   (one receive outstanding)
//! ```
//!
//! Within one session receive completions are strictly ordered (only one
//! receive is ever outstanding) and sends are FIFO (only one send is ever
//! outstanding).
//!
//! ## Example
//!
//! ```rust,ignore
//! use swarm_core::{EngineConfig, Session, SessionHandler, TokioEngine};
//!
//! struct Echo;
//! impl SessionHandler for Echo {}
//!
//! let engine = Arc::new(TokioEngine::new(EngineConfig::default())?);
//! let session = Session::new(engine, Echo, 65536, 65536);
//! session.add_ref();
//! session.connect("127.0.0.1:7777".parse()?)?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod engine;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use buffer::RingBuffer;
pub use engine::{CompletionEngine, CompletionSink, EngineConfig, TcpHandle, TokioEngine};
pub use error::{SessionError, SessionResult};
pub use session::{
    DisconnectReason, Session, SessionHandler, SessionState, SessionStats, SessionStatsSnapshot,
};

/// Default send buffer size per session, in bytes.
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 65_536;

/// Default receive buffer size per session, in bytes.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65_536;
