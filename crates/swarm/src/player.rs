//! # Player Session
//!
//! One simulated player: a [`Session`] whose handler logs in after the
//! connect completes and then generates traffic.
//!
//! ## Wire Frames
//!
//! ```text
//!   ┌──────────────┬──────────────┬─────────────────┐
//!   │ len: u16 LE  │ type: u16 LE │ payload         │
//!   └──────────────┴──────────────┴─────────────────┘
//!     len counts the whole frame, header included
//! ```
//!
//! The login payload is the player id (u64 LE) followed by the reservation
//! token bytes. Everything the game server sends back is opaque.
//!
//! ## Ownership
//!
//! The acquirer takes an application reference before connecting
//! ([`PlayerSession::hold_app_ref`]). The handler gives it back when the
//! connection is torn down, so the session is released once every pending
//! operation has completed.
//!
//! A retired player ([`PlayerSession::retire`]) is disconnected at once, and
//! a connect still in flight is torn down as soon as it completes.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use serde::Deserialize;
use swarm_core::{
    CompletionEngine, DisconnectReason, Session, SessionError, SessionHandler, SessionResult,
    SessionStatsSnapshot,
};
use swarm_placement::Endpoint;

/// Frame header size in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Login frame type.
pub const FRAME_LOGIN: u16 = 1;

/// Ping frame type.
pub const FRAME_PING: u16 = 2;

/// Random payload bytes carried by a ping.
const PING_PAYLOAD_LEN: usize = 32;

/// Encodes one frame.
pub fn encode_frame(frame_type: u16, payload: &[u8]) -> SessionResult<Vec<u8>> {
    let total = u16::try_from(FRAME_HEADER_LEN + payload.len())
        .map_err(|_| SessionError::io_post("send", "frame exceeds u16 length"))?;

    let mut frame = Vec::with_capacity(usize::from(total));
    frame.extend_from_slice(&total.to_le_bytes());
    frame.extend_from_slice(&frame_type.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encodes the login frame for a reservation.
pub fn login_frame(player_id: u64, token: &str) -> SessionResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(8 + token.len());
    payload.extend_from_slice(&player_id.to_le_bytes());
    payload.extend_from_slice(token.as_bytes());
    encode_frame(FRAME_LOGIN, &payload)
}

/// What a player does with the connection once logged in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficMode {
    /// Sends a ping after login and echoes every inbound byte.
    #[default]
    Echo,
    /// Drains and discards inbound bytes.
    Silent,
}

impl FromStr for TrafficMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "silent" => Ok(Self::Silent),
            other => Err(format!("unknown traffic mode '{other}' (expected echo or silent)")),
        }
    }
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Echo => "echo",
            Self::Silent => "silent",
        })
    }
}

/// Identity presented at login.
#[derive(Clone, Debug)]
struct Login {
    player_id: u64,
    token: String,
}

/// Handler driving one simulated player.
#[derive(Debug)]
pub struct PlayerHandler {
    traffic: TrafficMode,
    login: Mutex<Option<Login>>,
    /// Set while the application reference is held.
    app_ref: AtomicBool,
    /// Set when the owner is gone; connects completing afterwards are dropped.
    retired: AtomicBool,
    /// Connections torn down so far.
    disconnects: AtomicU64,
    /// Reason of the latest teardown.
    last_reason: Mutex<Option<DisconnectReason>>,
}

impl PlayerHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(traffic: TrafficMode) -> Self {
        Self {
            traffic,
            login: Mutex::new(None),
            app_ref: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            disconnects: AtomicU64::new(0),
            last_reason: Mutex::new(None),
        }
    }

    /// Returns the traffic mode.
    #[must_use]
    pub const fn traffic(&self) -> TrafficMode {
        self.traffic
    }

    /// Returns the player id of the latest connect request.
    #[must_use]
    pub fn player_id(&self) -> Option<u64> {
        self.login.lock().as_ref().map(|l| l.player_id)
    }

    /// Returns how many times the connection was torn down.
    #[must_use]
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Acquire)
    }

    /// Returns the reason of the latest teardown.
    #[must_use]
    pub fn last_disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.last_reason.lock()
    }

    fn send_or_drop<E: CompletionEngine>(session: &Session<Self, E>, frame: SessionResult<Vec<u8>>) {
        let sent = frame.and_then(|frame| session.post_send(&frame));
        if let Err(e) = sent {
            tracing::warn!(error = %e, "player send failed");
            if matches!(e, SessionError::SendBufferFull { .. }) {
                session.disconnect_request(DisconnectReason::SendBufferError);
            }
        }
    }
}

impl SessionHandler for PlayerHandler {
    fn on_connect<E: CompletionEngine>(&self, session: &Session<Self, E>) {
        if self.retired.load(Ordering::SeqCst) {
            session.disconnect_request(DisconnectReason::Active);
            return;
        }

        let Some(login) = self.login.lock().clone() else {
            tracing::warn!("connected without a reservation");
            session.disconnect_request(DisconnectReason::Active);
            return;
        };

        tracing::debug!(player_id = login.player_id, "player connected");
        Self::send_or_drop(session, login_frame(login.player_id, &login.token));

        if self.traffic == TrafficMode::Echo {
            let mut payload = [0u8; PING_PAYLOAD_LEN];
            rand::thread_rng().fill_bytes(&mut payload);
            Self::send_or_drop(session, encode_frame(FRAME_PING, &payload));
        }
    }

    fn on_read<E: CompletionEngine>(&self, session: &Session<Self, E>, len: usize) {
        match self.traffic {
            TrafficMode::Echo => {
                if let Err(e) = session.echo_back() {
                    tracing::debug!(error = %e, len, "echo failed");
                    if matches!(e, SessionError::SendBufferFull { .. }) {
                        session.disconnect_request(DisconnectReason::SendBufferError);
                    }
                }
            }
            TrafficMode::Silent => {
                session.consume_received(len);
            }
        }
    }

    fn on_disconnect<E: CompletionEngine>(&self, session: &Session<Self, E>, reason: DisconnectReason) {
        self.disconnects.fetch_add(1, Ordering::AcqRel);
        *self.last_reason.lock() = Some(reason);

        let player_id = self.player_id();
        if reason.is_local_error() {
            tracing::warn!(?player_id, %reason, "player disconnected");
        } else {
            tracing::info!(?player_id, %reason, "player disconnected");
        }

        if self.app_ref.swap(false, Ordering::AcqRel) {
            session.release_ref();
        }
    }

    fn on_release<E: CompletionEngine>(&self, _session: &Session<Self, E>) {
        tracing::debug!(player_id = ?self.player_id(), "player session released");
    }
}

/// A simulated player connection.
pub struct PlayerSession<E: CompletionEngine> {
    session: Arc<Session<PlayerHandler, E>>,
}

impl<E: CompletionEngine> PlayerSession<E> {
    /// Creates an unconnected player with the given buffer sizes.
    #[must_use]
    pub fn new(engine: Arc<E>, traffic: TrafficMode, send_buf_size: usize, recv_buf_size: usize) -> Self {
        Self {
            session: Session::new(engine, PlayerHandler::new(traffic), send_buf_size, recv_buf_size),
        }
    }

    /// Returns the underlying session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session<PlayerHandler, E>> {
        &self.session
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &PlayerHandler {
        self.session.handler()
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Returns a snapshot of the traffic counters.
    #[must_use]
    pub fn stats(&self) -> SessionStatsSnapshot {
        self.session.stats()
    }

    /// Takes the application reference. Returns false if it is already held.
    pub fn hold_app_ref(&self) -> bool {
        if self.handler().app_ref.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.session.add_ref();
        true
    }

    /// Gives the application reference back, if held.
    pub fn release_app_ref(&self) -> bool {
        if !self.handler().app_ref.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.session.release_ref();
        true
    }

    /// Connects to `endpoint` and logs in as `player_id` with `token`.
    ///
    /// Only the submission can fail here; a connect that fails later is
    /// reported through the disconnect notification.
    pub fn connect_request(&self, endpoint: &Endpoint, token: &str, player_id: u64) -> SessionResult<()> {
        let addr = endpoint
            .socket_addr()
            .map_err(|e| SessionError::io_post("connect", e.to_string()))?;

        *self.handler().login.lock() = Some(Login {
            player_id,
            token: token.to_string(),
        });
        self.session.connect(addr)
    }

    /// Requests an application disconnect. Returns false if not connected.
    pub fn disconnect(&self) -> bool {
        self.session.disconnect_request(DisconnectReason::Active)
    }

    /// Disconnects the player for good, including a connect still in flight.
    ///
    /// Returns true if a disconnect was issued right away.
    pub fn retire(&self) -> bool {
        self.handler().retired.store(true, Ordering::SeqCst);
        self.disconnect()
    }
}

impl<E: CompletionEngine> fmt::Debug for PlayerSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("player_id", &self.handler().player_id())
            .field("session", &self.session)
            .finish()
    }
}
