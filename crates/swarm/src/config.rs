//! # Load Test Configuration
//!
//! Loaded once at startup from a TOML file. Every field has a default, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [session]
//! max_players = 8
//! reserved_slot_margin = 1
//! start_player_id = 0
//!
//! [placement]
//! alias = "TEST_LOCAL"
//! region = "us-east-1"
//! match_queue = "dummy-queue"
//! poll_interval_ms = 500
//!
//! [traffic]
//! mode = "echo"
//! duration_secs = 30
//!
//! [runner]
//! session_count = 4
//! worker_threads = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use swarm_placement::{Endpoint, LOCAL_ALIAS, MAX_PLAYER_SESSIONS_PER_CALL};

use crate::acquirer::{AcquirerConfig, DEFAULT_CONNECT_DELAY};
use crate::error::{AcquireError, AcquireResult};
use crate::player::TrafficMode;
use crate::poll::PollPolicy;

/// Per-session player settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    /// Maximum players of each remote session.
    pub max_players: usize,
    /// Slots left free in each session; `max_players - margin` players are
    /// simulated.
    pub reserved_slot_margin: usize,
    /// Id of the first simulated player.
    pub start_player_id: u64,
    /// Prefix of player ids sent to the placement service.
    pub player_id_prefix: String,
    /// Per-player send buffer size.
    pub send_buffer_size: usize,
    /// Per-player receive buffer size.
    pub recv_buffer_size: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_players: 8,
            reserved_slot_margin: 1,
            start_player_id: 0,
            player_id_prefix: "DummyPlayer".to_string(),
            send_buffer_size: swarm_core::DEFAULT_SEND_BUFFER_SIZE,
            recv_buffer_size: swarm_core::DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Placement-service settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementSection {
    /// Fleet alias; `TEST_LOCAL` selects a local fleet.
    pub alias: String,
    /// Region for placement-service calls.
    pub region: String,
    /// Placement queue; when set, sessions are acquired through it.
    pub match_queue: Option<String>,
    /// Pause between two status polls.
    pub poll_interval_ms: u64,
    /// Give up polling after this long.
    pub poll_timeout_ms: Option<u64>,
    /// Give up polling after this many polls.
    pub poll_max_attempts: Option<u32>,
    /// Player ids the service accepts per reservation call.
    pub max_player_sessions_per_call: usize,
    /// Game server address handed out by the in-process placement service.
    pub local_server: String,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            alias: LOCAL_ALIAS.to_string(),
            region: "us-east-1".to_string(),
            match_queue: None,
            poll_interval_ms: 500,
            poll_timeout_ms: None,
            poll_max_attempts: None,
            max_player_sessions_per_call: MAX_PLAYER_SESSIONS_PER_CALL,
            local_server: "127.0.0.1:7777".to_string(),
        }
    }
}

/// Traffic settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrafficSection {
    /// What players do once logged in.
    pub mode: TrafficMode,
    /// Pause between two connect submissions.
    pub connect_delay_ms: u64,
    /// How long players stay connected.
    pub duration_secs: u64,
}

impl Default for TrafficSection {
    fn default() -> Self {
        Self {
            mode: TrafficMode::Echo,
            connect_delay_ms: u64::try_from(DEFAULT_CONNECT_DELAY.as_millis()).unwrap_or(10),
            duration_secs: 30,
        }
    }
}

/// Runner settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSection {
    /// Remote sessions to acquire.
    pub session_count: usize,
    /// Orchestration threads running acquirers.
    pub worker_threads: usize,
    /// Completion engine worker threads.
    pub engine_threads: usize,
    /// Connect timeout of the completion engine.
    pub connect_timeout_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            session_count: 1,
            worker_threads: 1,
            engine_threads: 4,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Complete load-test configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadTestConfig {
    /// Per-session player settings.
    pub session: SessionSection,
    /// Placement-service settings.
    pub placement: PlacementSection,
    /// Traffic settings.
    pub traffic: TrafficSection,
    /// Runner settings.
    pub runner: RunnerSection,
}

impl LoadTestConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> AcquireResult<Self> {
        toml::from_str(text).map_err(|e| AcquireError::Config(e.to_string()))
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> AcquireResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Players simulated per session.
    #[must_use]
    pub const fn players_per_session(&self) -> usize {
        self.session.max_players.saturating_sub(self.session.reserved_slot_margin)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> AcquireResult<()> {
        let session = &self.session;
        if session.max_players == 0 {
            return Err(AcquireError::Config("session.max_players must be positive".into()));
        }
        if session.reserved_slot_margin >= session.max_players {
            return Err(AcquireError::Config(format!(
                "session.reserved_slot_margin ({}) must be below session.max_players ({})",
                session.reserved_slot_margin, session.max_players
            )));
        }
        if self.players_per_session() >= self.placement.max_player_sessions_per_call {
            return Err(AcquireError::Config(format!(
                "{} players per session must stay below the per-call limit of {}",
                self.players_per_session(),
                self.placement.max_player_sessions_per_call
            )));
        }
        if session.send_buffer_size == 0 || session.recv_buffer_size == 0 {
            return Err(AcquireError::Config("buffer sizes must be positive".into()));
        }
        if self.placement.poll_interval_ms == 0 {
            return Err(AcquireError::Config("placement.poll_interval_ms must be positive".into()));
        }
        if self.runner.worker_threads == 0 || self.runner.engine_threads == 0 {
            return Err(AcquireError::Config("thread counts must be positive".into()));
        }
        self.local_endpoint()?;
        Ok(())
    }

    /// Parses `placement.local_server` into an endpoint.
    pub fn local_endpoint(&self) -> AcquireResult<Endpoint> {
        let addr: std::net::SocketAddr = self.placement.local_server.parse().map_err(|_| {
            AcquireError::Config(format!(
                "placement.local_server '{}' is not an ip:port address",
                self.placement.local_server
            ))
        })?;
        Ok(Endpoint::new(addr.ip().to_string(), addr.port()))
    }

    /// Status polling policy.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.placement.poll_interval_ms),
            timeout: self.placement.poll_timeout_ms.map(Duration::from_millis),
            max_attempts: self.placement.poll_max_attempts,
        }
    }

    /// Settings of the `index`-th acquirer.
    ///
    /// Player ids of different acquirers never overlap.
    #[must_use]
    pub fn acquirer_config(&self, index: usize) -> AcquirerConfig {
        let players = self.players_per_session();
        AcquirerConfig {
            max_players: self.session.max_players,
            player_count: players,
            start_player_id: self.session.start_player_id + (index * players) as u64,
            player_id_prefix: self.session.player_id_prefix.clone(),
            alias: self.placement.alias.clone(),
            region: self.placement.region.clone(),
            match_queue: self.placement.match_queue.clone(),
            traffic: self.traffic.mode,
            poll: self.poll_policy(),
            connect_delay: Duration::from_millis(self.traffic.connect_delay_ms),
            send_buffer_size: self.session.send_buffer_size,
            recv_buffer_size: self.session.recv_buffer_size,
        }
    }
}
