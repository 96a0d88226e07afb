//! # Tokio Completion Engine
//!
//! Executes posted operations as tasks on a multi-threaded tokio runtime and
//! invokes session completions from the runtime's worker threads.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{Mutex, Notify};

use super::{CompletionEngine, CompletionSink};
use crate::error::{SessionError, SessionResult};
use crate::session::DisconnectReason;

/// Completion engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of runtime worker threads.
    pub worker_threads: usize,
    /// Connect attempts longer than this fail with `TimedOut`.
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared state behind a [`TcpHandle`].
struct TcpInner {
    /// Read half; only one receive is ever outstanding.
    reader: Mutex<OwnedReadHalf>,
    /// Write half; only one send is ever outstanding.
    writer: Mutex<OwnedWriteHalf>,
    /// Set once a disconnect has been posted.
    closed: AtomicBool,
    /// Wakes an outstanding receive on disconnect.
    shutdown: Notify,
    /// Remote address.
    peer: SocketAddr,
}

/// Connection handle produced by [`TokioEngine`].
#[derive(Clone)]
pub struct TcpHandle {
    inner: Arc<TcpInner>,
}

impl TcpHandle {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            inner: Arc::new(TcpInner {
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                peer,
            }),
        }
    }

    /// Returns the remote address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer
    }

    /// Returns true once a disconnect was posted for this handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TcpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpHandle")
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Tokio-backed completion engine.
///
/// Completions are invoked on runtime worker threads, so session callbacks
/// for different sessions run in parallel.
pub struct TokioEngine {
    /// Owned runtime; taken on drop.
    runtime: Option<Runtime>,
    /// Spawn handle.
    handle: Handle,
    /// Configuration.
    config: EngineConfig,
}

impl TokioEngine {
    /// Starts a runtime with `config.worker_threads` workers.
    pub fn new(config: EngineConfig) -> SessionResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("swarm-io")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| SessionError::EngineStart(e.to_string()))?;
        let handle = runtime.handle().clone();

        tracing::debug!(workers = config.worker_threads, "completion engine started");

        Ok(Self {
            runtime: Some(runtime),
            handle,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_open(handle: &TcpHandle, operation: &'static str) -> SessionResult<()> {
        if handle.is_closed() {
            return Err(SessionError::io_post(operation, "handle already closed"));
        }
        Ok(())
    }
}

impl CompletionEngine for TokioEngine {
    type Handle = TcpHandle;

    fn post_connect(
        &self,
        addr: SocketAddr,
        sink: Arc<dyn CompletionSink<TcpHandle>>,
    ) -> SessionResult<()> {
        let timeout = self.config.connect_timeout;

        self.handle.spawn(async move {
            let result = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    // Latency matters more than throughput for game traffic
                    let _ = stream.set_nodelay(true);
                    Ok(TcpHandle::new(stream, addr))
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            };
            sink.connect_completion(result);
        });

        Ok(())
    }

    fn post_receive(
        &self,
        handle: &TcpHandle,
        max_len: usize,
        sink: Arc<dyn CompletionSink<TcpHandle>>,
    ) -> SessionResult<()> {
        Self::ensure_open(handle, "receive")?;
        if max_len == 0 {
            return Err(SessionError::io_post("receive", "no room in receive buffer"));
        }

        let inner = Arc::clone(&handle.inner);
        self.handle.spawn(async move {
            let mut buf = vec![0u8; max_len];
            let result = {
                let mut reader = inner.reader.lock().await;
                tokio::select! {
                    read = reader.read(&mut buf) => read.map(|n| {
                        buf.truncate(n);
                        buf
                    }),
                    () = inner.shutdown.notified() => Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "receive aborted by disconnect",
                    )),
                }
            };
            sink.recv_completion(result);
        });

        Ok(())
    }

    fn post_send(
        &self,
        handle: &TcpHandle,
        data: Vec<u8>,
        sink: Arc<dyn CompletionSink<TcpHandle>>,
    ) -> SessionResult<()> {
        Self::ensure_open(handle, "send")?;

        let inner = Arc::clone(&handle.inner);
        self.handle.spawn(async move {
            let result = {
                let mut writer = inner.writer.lock().await;
                writer.write_all(&data).await.map(|()| data.len())
            };
            sink.send_completion(result);
        });

        Ok(())
    }

    fn post_disconnect(
        &self,
        handle: TcpHandle,
        reason: DisconnectReason,
        sink: Arc<dyn CompletionSink<TcpHandle>>,
    ) -> SessionResult<()> {
        if handle.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(SessionError::io_post("disconnect", "handle already closed"));
        }
        // Stores a permit if the receive task is not waiting yet
        handle.inner.shutdown.notify_one();

        self.handle.spawn(async move {
            {
                let mut writer = handle.inner.writer.lock().await;
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(peer = %handle.inner.peer, error = %e, "shutdown failed");
                }
            }
            drop(handle);
            sink.disconnect_completion(reason);
        });

        Ok(())
    }
}

impl Drop for TokioEngine {
    fn drop(&mut self) {
        // The last session reference may be dropped on a worker thread, where
        // a blocking shutdown would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
