//! Inline completion engine for unit tests.
//!
//! Connects, sends and disconnects complete on the posting thread. Receives
//! are parked until [`InlineEngine::deliver`] feeds them data.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use swarm_core::{CompletionEngine, CompletionSink, DisconnectReason, SessionError, SessionResult};

type Sink = Arc<dyn CompletionSink<u32>>;

#[derive(Default)]
pub(crate) struct InlineEngine {
    next_handle: AtomicU32,
    /// Fails connect posts once this many connects were accepted.
    pub reject_connects_after: Mutex<Option<usize>>,
    /// Completes connects with an error.
    pub refuse_connect: AtomicBool,
    pub connects: Mutex<Vec<SocketAddr>>,
    pub sent: Mutex<Vec<(u32, Vec<u8>)>>,
    pub disconnects: Mutex<Vec<(u32, DisconnectReason)>>,
    receives: Mutex<Vec<(u32, Sink)>>,
}

impl InlineEngine {
    /// Completes the parked receive of `handle` with `data`.
    pub fn deliver(&self, handle: u32, data: &[u8]) -> bool {
        let sink = {
            let mut receives = self.receives.lock();
            let Some(index) = receives.iter().position(|(h, _)| *h == handle) else {
                return false;
            };
            receives.remove(index).1
        };
        sink.recv_completion(Ok(data.to_vec()));
        true
    }

    pub fn sent_to(&self, handle: u32) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

impl CompletionEngine for InlineEngine {
    type Handle = u32;

    fn post_connect(&self, addr: SocketAddr, sink: Sink) -> SessionResult<()> {
        {
            let mut connects = self.connects.lock();
            if self.reject_connects_after.lock().is_some_and(|n| connects.len() >= n) {
                return Err(SessionError::io_post("connect", "rejected"));
            }
            connects.push(addr);
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            sink.connect_completion(Err(io::ErrorKind::ConnectionRefused.into()));
        } else {
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
            sink.connect_completion(Ok(handle));
        }
        Ok(())
    }

    fn post_receive(&self, handle: &u32, _max_len: usize, sink: Sink) -> SessionResult<()> {
        self.receives.lock().push((*handle, sink));
        Ok(())
    }

    fn post_send(&self, handle: &u32, data: Vec<u8>, sink: Sink) -> SessionResult<()> {
        let len = data.len();
        self.sent.lock().push((*handle, data));
        sink.send_completion(Ok(len));
        Ok(())
    }

    fn post_disconnect(&self, handle: u32, reason: DisconnectReason, sink: Sink) -> SessionResult<()> {
        self.disconnects.lock().push((handle, reason));

        // Abort the parked receive like a closed socket would
        let parked = {
            let mut receives = self.receives.lock();
            receives
                .iter()
                .position(|(h, _)| *h == handle)
                .map(|index| receives.remove(index).1)
        };
        if let Some(recv_sink) = parked {
            recv_sink.recv_completion(Err(io::ErrorKind::ConnectionAborted.into()));
        }

        sink.disconnect_completion(reason);
        Ok(())
    }
}
