//! # Session Acquirer
//!
//! Negotiates one remote game session through the placement service and
//! drives a pool of simulated players into it.
//!
//! ## Workflow
//!
//! ```text
//!  Idle ──▶ Negotiating ──┬──▶ PlacementPending ──▶ Fulfilled ──┐
//!                         ├──▶ Found ───────────────────────────┤
//!                         └──▶ Created ─────────────────────────┤
//!                                                               ▼
//!       Disconnected ◀── TearingDown ◀── Ready ◀── PlayersConnecting ◀── PlayersReserving
//! ```
//!
//! ## Locking
//!
//! Every workflow step runs under the acquirer's single state lock, held for
//! the whole step including placement-service calls, poll sleeps and the
//! connect pacing delay. Concurrent callers on one acquirer are serialized;
//! independent acquirers never contend.
//!
//! ## Regions
//!
//! Each acquirer owns its region: the configured one until a fulfilled
//! placement reports another. Every placement-service call names it, so
//! acquirers sharing one service never redirect each other.
//!
//! ## Teardown
//!
//! Dropping the acquirer retires every pooled player. Connected players are
//! disconnected and connects still in flight are torn down on completion.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use swarm_core::{CompletionEngine, SessionStatsSnapshot};
use swarm_placement::{
    CreateSessionRequest, Endpoint, FleetOrAlias, PlacementDescriptor, PlacementError,
    PlacementRequest, PlacementService, PlacementStatus, PlayerReservation, SearchRequest,
    SessionDescriptor, SessionStatus, LOCAL_ALIAS,
};
use uuid::Uuid;

use crate::error::{AcquireError, AcquireResult};
use crate::player::{PlayerSession, TrafficMode};
use crate::poll::{CancelToken, PollOutcome, PollPolicy, Poller};

/// Search filter for sessions nobody has joined yet.
pub const DEFAULT_SESSION_FILTER: &str = "playerSessionCount=0 AND hasAvailablePlayerSessions=true";

/// Delay between two connect submissions.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(10);

/// Where an acquirer is in its workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AcquirePhase {
    /// Nothing negotiated.
    Idle = 0,
    /// Talking to the placement service.
    Negotiating = 1,
    /// Waiting for a queued placement.
    PlacementPending = 2,
    /// A placement was fulfilled.
    Fulfilled = 3,
    /// An existing session was found.
    Found = 4,
    /// A new session was created and is active.
    Created = 5,
    /// Player slots are reserved.
    PlayersReserving = 6,
    /// Connects are being submitted.
    PlayersConnecting = 7,
    /// Every connect was submitted.
    Ready = 8,
    /// Disconnects are being issued.
    TearingDown = 9,
    /// Every connected player was told to disconnect.
    Disconnected = 10,
    /// The last step failed.
    Failed = 11,
}

impl AcquirePhase {
    /// Returns true once a remote session is known.
    #[must_use]
    pub const fn has_session(self) -> bool {
        matches!(
            self,
            Self::Fulfilled
                | Self::Found
                | Self::Created
                | Self::PlayersReserving
                | Self::PlayersConnecting
                | Self::Ready
        )
    }
}

impl Default for AcquirePhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Per-acquirer settings.
#[derive(Clone, Debug)]
pub struct AcquirerConfig {
    /// Maximum players of the remote session, and of the local pool.
    pub max_players: usize,
    /// Players to simulate.
    pub player_count: usize,
    /// Id of the first player; player `i` is `start_player_id + i`.
    pub start_player_id: u64,
    /// Prefix of the player ids sent to the placement service.
    pub player_id_prefix: String,
    /// Fleet alias, or [`LOCAL_ALIAS`] for a local fleet.
    pub alias: String,
    /// Region for placement-service calls.
    pub region: String,
    /// Placement queue; when set, sessions are acquired through it.
    pub match_queue: Option<String>,
    /// Traffic each player generates.
    pub traffic: TrafficMode,
    /// Status polling.
    pub poll: PollPolicy,
    /// Pause between two connect submissions.
    pub connect_delay: Duration,
    /// Per-player send buffer size.
    pub send_buffer_size: usize,
    /// Per-player receive buffer size.
    pub recv_buffer_size: usize,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            player_count: 7,
            start_player_id: 0,
            player_id_prefix: "DummyPlayer".to_string(),
            alias: LOCAL_ALIAS.to_string(),
            region: "us-east-1".to_string(),
            match_queue: None,
            traffic: TrafficMode::Echo,
            poll: PollPolicy::default(),
            connect_delay: DEFAULT_CONNECT_DELAY,
            send_buffer_size: swarm_core::DEFAULT_SEND_BUFFER_SIZE,
            recv_buffer_size: swarm_core::DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// State guarded by the acquirer lock.
struct AcquirerState<E: CompletionEngine> {
    phase: AcquirePhase,
    /// Owned pool; dropped with the acquirer.
    players: Vec<PlayerSession<E>>,
    endpoint: Option<Endpoint>,
    session_id: Option<String>,
    placement_id: Option<String>,
    /// Region reported by a fulfilled placement; overrides the configured one.
    region: Option<String>,
    /// Reservation tokens, paired with `players` by position.
    reservations: Vec<PlayerReservation>,
}

impl<E: CompletionEngine> AcquirerState<E> {
    fn new() -> Self {
        Self {
            phase: AcquirePhase::Idle,
            players: Vec::new(),
            endpoint: None,
            session_id: None,
            placement_id: None,
            region: None,
            reservations: Vec::new(),
        }
    }

    /// Region to name in the next placement-service call.
    fn call_region(&self, configured: &str) -> String {
        self.region.as_deref().unwrap_or(configured).to_string()
    }

    fn adopt_session(&mut self, descriptor: &SessionDescriptor) {
        self.session_id = Some(descriptor.session_id.clone());
        self.endpoint = Some(descriptor.endpoint.clone());
    }
}

/// Acquires a remote session and drives a pool of players into it.
pub struct SessionAcquirer<E: CompletionEngine> {
    name: String,
    config: AcquirerConfig,
    engine: Arc<E>,
    placement: Arc<dyn PlacementService>,
    poller: Poller,
    state: Mutex<AcquirerState<E>>,
}

impl<E: CompletionEngine> SessionAcquirer<E> {
    /// Creates an idle acquirer.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: AcquirerConfig,
        engine: Arc<E>,
        placement: Arc<dyn PlacementService>,
        cancel: CancelToken,
    ) -> Self {
        let poller = Poller::new(config.poll, cancel);
        Self {
            name: name.into(),
            config,
            engine,
            placement,
            poller,
            state: Mutex::new(AcquirerState::new()),
        }
    }

    /// Returns the acquirer name (also the session name it creates).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AcquirerConfig {
        &self.config
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> AcquirePhase {
        self.state.lock().phase
    }

    /// Returns the negotiated endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.state.lock().endpoint.clone()
    }

    /// Returns the negotiated session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.state.lock().session_id.clone()
    }

    /// Returns the id of the latest placement.
    #[must_use]
    pub fn placement_id(&self) -> Option<String> {
        self.state.lock().placement_id.clone()
    }

    /// Returns the region a fulfilled placement was placed in.
    ///
    /// Calls go to the configured region until then.
    #[must_use]
    pub fn region(&self) -> Option<String> {
        self.state.lock().region.clone()
    }

    /// Returns the number of players in the pool.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.state.lock().players.len()
    }

    /// Returns the number of currently connected players.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.state.lock().players.iter().filter(|p| p.is_connected()).count()
    }

    /// Returns the summed traffic counters of every player.
    #[must_use]
    pub fn stats(&self) -> SessionStatsSnapshot {
        let state = self.state.lock();
        let mut total = SessionStatsSnapshot::default();
        for player in &state.players {
            total.accumulate(&player.stats());
        }
        total
    }

    /// Runs `f` on every player while holding the state lock.
    pub fn for_each_player(&self, mut f: impl FnMut(usize, &PlayerSession<E>)) {
        let state = self.state.lock();
        for (index, player) in state.players.iter().enumerate() {
            f(index, player);
        }
    }

    // =========================================================================
    // Pool
    // =========================================================================

    /// Fills the pool up to the configured player count.
    ///
    /// Returns the pool size. Fails if the pool would exceed the session's
    /// maximum players.
    pub fn prepare_player_sessions(&self) -> AcquireResult<usize> {
        let mut state = self.state.lock();
        let wanted = self.config.player_count;
        if wanted > self.config.max_players {
            return Err(AcquireError::Config(format!(
                "{wanted} players exceed the session maximum of {}",
                self.config.max_players
            )));
        }
        if self.config.send_buffer_size == 0 || self.config.recv_buffer_size == 0 {
            return Err(AcquireError::Config("player buffer sizes must be non-zero".to_string()));
        }

        while state.players.len() < wanted {
            state.players.push(PlayerSession::new(
                Arc::clone(&self.engine),
                self.config.traffic,
                self.config.send_buffer_size,
                self.config.recv_buffer_size,
            ));
        }
        Ok(state.players.len())
    }

    // =========================================================================
    // Negotiation
    // =========================================================================

    /// Creates a session and blocks until it is `Active`.
    ///
    /// Polls at the configured interval. The first describe error ends the
    /// wait; an `Error` or `Terminated` status ends it too.
    pub fn create_session(&self, name: &str, max_players: usize) -> AcquireResult<SessionDescriptor> {
        let mut state = self.state.lock();
        state.phase = AcquirePhase::Negotiating;
        let region = state.call_region(&self.config.region);

        let request = CreateSessionRequest {
            name: name.to_string(),
            max_players,
            target: FleetOrAlias::for_session(&self.config.alias, name),
        };
        let descriptor = self
            .placement
            .create_session(&region, &request)
            .map_err(|e| Self::fail(&mut state, "create session", e))?;
        state.adopt_session(&descriptor);

        tracing::info!(session_id = %descriptor.session_id, endpoint = %descriptor.endpoint, "session created, waiting for activation");

        let outcome = self.poller.poll(|| {
            match self.placement.describe_session_status(&region, &descriptor.session_id) {
                Ok(SessionStatus::Active) => Ok(Some(())),
                Ok(status) if status.is_terminal_failure() => Err(AcquireError::TerminalStatus {
                    what: "session",
                    status: format!("{status:?}"),
                }),
                Ok(_) => Ok(None),
                Err(e) => Err(e.into()),
            }
        });

        match Self::finish_poll(outcome) {
            Ok(()) => {
                state.phase = AcquirePhase::Created;
                tracing::info!(session_id = %descriptor.session_id, "session active");
                Ok(SessionDescriptor {
                    status: SessionStatus::Active,
                    ..descriptor
                })
            }
            Err(e) => {
                tracing::error!(session_id = %descriptor.session_id, error = %e, "session never became active");
                state.phase = AcquirePhase::Failed;
                Err(e)
            }
        }
    }

    /// Searches once for an available session. Returns whether one was found.
    ///
    /// A local fleet cannot be searched: that returns `Ok(false)` without
    /// contacting the service.
    pub fn find_available_session(&self, filter: &str, limit: usize) -> AcquireResult<bool> {
        if self.config.alias == LOCAL_ALIAS {
            return Ok(false);
        }

        let mut state = self.state.lock();
        state.phase = AcquirePhase::Negotiating;
        let region = state.call_region(&self.config.region);

        let request = SearchRequest {
            alias: self.config.alias.clone(),
            filter: filter.to_string(),
            limit,
        };
        let found = self
            .placement
            .search_sessions(&region, &request)
            .map_err(|e| Self::fail(&mut state, "search sessions", e))?;

        match found.first() {
            Some(descriptor) => {
                state.adopt_session(descriptor);
                state.phase = AcquirePhase::Found;
                tracing::info!(session_id = %descriptor.session_id, "found available session");
                Ok(true)
            }
            None => {
                state.phase = AcquirePhase::Idle;
                Ok(false)
            }
        }
    }

    /// Queues a placement and blocks until it is fulfilled.
    pub fn start_placement(&self, queue_name: &str, max_players: usize) -> AcquireResult<()> {
        let mut state = self.state.lock();
        state.phase = AcquirePhase::Negotiating;
        // A new placement starts from the configured region
        state.region = None;
        let region = self.config.region.as_str();

        let request = PlacementRequest {
            queue_name: queue_name.to_string(),
            max_players,
            placement_id: Uuid::new_v4().to_string(),
        };
        state.placement_id = Some(request.placement_id.clone());

        let descriptor = self
            .placement
            .start_placement(region, &request)
            .map_err(|e| Self::fail(&mut state, "start placement", e))?;

        match descriptor.status {
            PlacementStatus::Fulfilled => Self::adopt_placement(&mut state, &descriptor),
            PlacementStatus::Pending => {
                state.phase = AcquirePhase::PlacementPending;
                tracing::info!(placement_id = %request.placement_id, queue = queue_name, "placement pending");
                self.poll_placement_locked(&mut state)
            }
            status => {
                state.phase = AcquirePhase::Failed;
                Err(AcquireError::TerminalStatus {
                    what: "placement",
                    status: format!("{status:?}"),
                })
            }
        }
    }

    /// Blocks until the pending placement is fulfilled.
    pub fn poll_placement(&self) -> AcquireResult<()> {
        let mut state = self.state.lock();
        self.poll_placement_locked(&mut state)
    }

    fn poll_placement_locked(&self, state: &mut AcquirerState<E>) -> AcquireResult<()> {
        let placement_id = state.placement_id.clone().ok_or(AcquireError::NoSession)?;
        let region = state.call_region(&self.config.region);

        let outcome = self.poller.poll(|| match self.placement.describe_placement(&region, &placement_id) {
            Ok(d) if d.status == PlacementStatus::Fulfilled => Ok(Some(d)),
            Ok(d) if d.status.is_terminal_failure() => Err(AcquireError::TerminalStatus {
                what: "placement",
                status: format!("{:?}", d.status),
            }),
            Ok(_) => Ok(None),
            Err(e) => Err(e.into()),
        });

        match Self::finish_poll(outcome) {
            Ok(descriptor) => Self::adopt_placement(state, &descriptor),
            Err(e) => {
                tracing::error!(%placement_id, error = %e, "placement not fulfilled");
                state.phase = AcquirePhase::Failed;
                Err(e)
            }
        }
    }

    fn adopt_placement(state: &mut AcquirerState<E>, descriptor: &PlacementDescriptor) -> AcquireResult<()> {
        let (Some(session_id), Some(endpoint)) = (&descriptor.session_id, &descriptor.endpoint) else {
            state.phase = AcquirePhase::Failed;
            return Err(AcquireError::RemoteAction {
                action: "start placement",
                message: "fulfilled placement carries no session".to_string(),
            });
        };

        state.session_id = Some(session_id.clone());
        state.endpoint = Some(endpoint.clone());
        if let Some(region) = &descriptor.region {
            state.region = Some(region.clone());
        }
        state.phase = AcquirePhase::Fulfilled;

        tracing::info!(
            placement_id = %descriptor.placement_id,
            %session_id,
            %endpoint,
            region = ?descriptor.region,
            "placement fulfilled"
        );
        Ok(())
    }

    /// Negotiates a session the configured way: through the placement queue
    /// when one is set, otherwise find-or-create.
    pub fn acquire(&self) -> AcquireResult<()> {
        if let Some(queue) = &self.config.match_queue {
            return self.start_placement(queue, self.config.max_players);
        }
        if self.find_available_session(DEFAULT_SESSION_FILTER, 1)? {
            return Ok(());
        }
        self.create_session(&self.name, self.config.max_players).map(|_| ())
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Reserves `count` player slots in the negotiated session.
    ///
    /// `count` must stay below the per-call limit and within the pool.
    /// Returns the reservations in player order.
    pub fn reserve_player_slots(&self, count: usize) -> AcquireResult<Vec<PlayerReservation>> {
        let mut state = self.state.lock();
        let session_id = state.session_id.clone().ok_or(AcquireError::NoSession)?;
        let region = state.call_region(&self.config.region);

        let limit = self.placement.max_players_per_call();
        if count >= limit {
            return Err(AcquireError::Config(format!(
                "{count} reservations in one call, limit is below {limit}"
            )));
        }
        if count > state.players.len() {
            return Err(AcquireError::Config(format!(
                "{count} reservations for a pool of {}",
                state.players.len()
            )));
        }

        let player_ids: Vec<String> = (0..count as u64)
            .map(|i| format!("{}{}", self.config.player_id_prefix, self.config.start_player_id + i))
            .collect();

        let reservations = self
            .placement
            .reserve_player_slots(&region, &session_id, &player_ids)
            .map_err(|e| Self::fail(&mut state, "reserve player slots", e))?;

        tracing::info!(%session_id, %region, count = reservations.len(), "player slots reserved");
        state.reservations.clone_from(&reservations);
        state.phase = AcquirePhase::PlayersReserving;
        Ok(reservations)
    }

    /// Connects every reserved player, in order, pacing submissions.
    ///
    /// Player `i` logs in as `start_player_id + i` with reservation `i`. The
    /// first rejected submission aborts the loop; players already submitted
    /// stay connected.
    pub fn connect_players(&self) -> AcquireResult<usize> {
        let mut state = self.state.lock();
        let endpoint = state.endpoint.clone().ok_or(AcquireError::NoSession)?;
        state.phase = AcquirePhase::PlayersConnecting;

        let state = &mut *state;
        let total = state.reservations.len().min(state.players.len());
        let pairs = state.players.iter().zip(&state.reservations).enumerate();

        for (index, (player, reservation)) in pairs {
            let player_id = self.config.start_player_id + index as u64;
            if index > 0 && !self.config.connect_delay.is_zero() {
                thread::sleep(self.config.connect_delay);
            }

            let held = player.hold_app_ref();
            if let Err(source) = player.connect_request(&endpoint, &reservation.token, player_id) {
                if held {
                    player.release_app_ref();
                }
                tracing::error!(player_id, error = %source, issued = index, total, "connect submission failed");
                state.phase = AcquirePhase::Failed;
                return Err(AcquireError::PartialConnectFailure {
                    issued: index,
                    total,
                    source,
                });
            }
        }

        state.phase = AcquirePhase::Ready;
        tracing::info!(total, %endpoint, "players connecting");
        Ok(total)
    }

    /// Disconnects every player that is connected right now.
    ///
    /// Returns the number of disconnects issued.
    pub fn disconnect_players(&self) -> usize {
        let mut state = self.state.lock();
        state.phase = AcquirePhase::TearingDown;

        let issued = state
            .players
            .iter()
            .filter(|p| p.is_connected())
            .filter(|p| p.disconnect())
            .count();

        state.phase = AcquirePhase::Disconnected;
        tracing::info!(issued, "players disconnected");
        issued
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn fail(state: &mut AcquirerState<E>, action: &'static str, error: PlacementError) -> AcquireError {
        tracing::error!(action, error = %error, "placement service call failed");
        state.phase = AcquirePhase::Failed;
        error.into()
    }

    fn finish_poll<T>(outcome: AcquireResult<PollOutcome<T>>) -> AcquireResult<T> {
        match outcome? {
            PollOutcome::Ready(value) => Ok(value),
            PollOutcome::TimedOut { attempts } => Err(AcquireError::TimedOut { attempts }),
            PollOutcome::Cancelled => Err(AcquireError::Cancelled),
        }
    }
}

impl<E: CompletionEngine> Drop for SessionAcquirer<E> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let issued = state.players.iter().filter(|p| p.retire()).count();
        if issued > 0 {
            tracing::debug!(name = %self.name, issued, "players disconnected on drop");
        }
    }
}

impl<E: CompletionEngine> std::fmt::Debug for SessionAcquirer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionAcquirer")
            .field("name", &self.name)
            .field("phase", &state.phase)
            .field("session_id", &state.session_id)
            .field("players", &state.players.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_engine::InlineEngine;
    use swarm_core::DisconnectReason;
    use swarm_placement::{LocalPlacementService, LocalServiceConfig};

    fn fast_poll() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: None,
            max_attempts: Some(50),
        }
    }

    fn config() -> AcquirerConfig {
        AcquirerConfig {
            alias: "alias-1".to_string(),
            poll: fast_poll(),
            connect_delay: Duration::ZERO,
            send_buffer_size: 1024,
            recv_buffer_size: 1024,
            ..AcquirerConfig::default()
        }
    }

    fn setup(
        config: AcquirerConfig,
        service: LocalServiceConfig,
    ) -> (SessionAcquirer<InlineEngine>, Arc<InlineEngine>, Arc<LocalPlacementService>) {
        let engine = Arc::new(InlineEngine::default());
        let placement = Arc::new(LocalPlacementService::new(service));
        let acquirer = SessionAcquirer::new(
            "test-session",
            config,
            Arc::clone(&engine),
            Arc::clone(&placement) as Arc<dyn PlacementService>,
            CancelToken::new(),
        );
        (acquirer, engine, placement)
    }

    #[test]
    fn test_create_session_waits_for_active() {
        let (acquirer, _, placement) = setup(
            config(),
            LocalServiceConfig {
                activation_polls: 3,
                ..LocalServiceConfig::default()
            },
        );

        let descriptor = acquirer.create_session("alpha", 8).unwrap();

        assert_eq!(descriptor.status, SessionStatus::Active);
        assert_eq!(placement.describe_calls(), 3);
        assert_eq!(acquirer.phase(), AcquirePhase::Created);
        assert_eq!(acquirer.session_id(), Some(descriptor.session_id));
    }

    #[test]
    fn test_create_session_stops_on_first_describe_error() {
        let (acquirer, _, placement) = setup(config(), LocalServiceConfig::default());
        placement.set_fail_describe(true);

        let result = acquirer.create_session("alpha", 8);

        assert!(matches!(result, Err(AcquireError::RemoteDescribe(_))));
        assert_eq!(placement.describe_calls(), 1);
        assert_eq!(acquirer.phase(), AcquirePhase::Failed);
    }

    #[test]
    fn test_create_session_times_out() {
        let (acquirer, _, _) = setup(
            AcquirerConfig {
                poll: PollPolicy {
                    max_attempts: Some(2),
                    ..fast_poll()
                },
                ..config()
            },
            LocalServiceConfig {
                activation_polls: 10,
                ..LocalServiceConfig::default()
            },
        );

        assert!(matches!(
            acquirer.create_session("alpha", 8),
            Err(AcquireError::TimedOut { attempts: 2 })
        ));
    }

    #[test]
    fn test_local_alias_uses_fleet_and_skips_search() {
        let (acquirer, _, placement) = setup(
            AcquirerConfig {
                alias: LOCAL_ALIAS.to_string(),
                ..config()
            },
            LocalServiceConfig::default(),
        );
        placement.set_fail_actions(true);

        // Would fail if the service were contacted
        assert!(!acquirer.find_available_session(DEFAULT_SESSION_FILTER, 1).unwrap());

        placement.set_fail_actions(false);
        let descriptor = acquirer.create_session("alpha", 8).unwrap();
        assert_eq!(
            placement.session_target(&descriptor.session_id),
            Some(FleetOrAlias::Fleet("fleet-alpha".to_string()))
        );
    }

    #[test]
    fn test_find_available_session() {
        let (acquirer, _, placement) = setup(config(), LocalServiceConfig::default());
        assert!(!acquirer.find_available_session(DEFAULT_SESSION_FILTER, 1).unwrap());

        let existing = placement.insert_active_session("other", 8);
        assert!(acquirer.find_available_session(DEFAULT_SESSION_FILTER, 1).unwrap());
        assert_eq!(acquirer.session_id(), Some(existing.session_id));
        assert_eq!(acquirer.phase(), AcquirePhase::Found);
    }

    #[test]
    fn test_placement_switches_region() {
        let (acquirer, _, placement) = setup(
            AcquirerConfig {
                match_queue: Some("queue-1".to_string()),
                region: "us-west-2".to_string(),
                ..config()
            },
            LocalServiceConfig {
                placement_polls: 2,
                region: "eu-central-1".to_string(),
                ..LocalServiceConfig::default()
            },
        );

        acquirer.acquire().unwrap();

        assert_eq!(acquirer.phase(), AcquirePhase::Fulfilled);
        assert_eq!(acquirer.region().as_deref(), Some("eu-central-1"));
        assert_eq!(placement.regions_of("start placement"), ["us-west-2"]);
        assert_eq!(placement.regions_of("describe placement"), ["us-west-2", "us-west-2"]);

        acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(3).unwrap();
        assert_eq!(placement.regions_of("reserve player slots"), ["eu-central-1"]);
        assert!(acquirer.endpoint().is_some());
        assert!(Uuid::parse_str(&acquirer.placement_id().unwrap()).is_ok());
    }

    #[test]
    fn test_immediately_fulfilled_placement() {
        let (acquirer, _, placement) = setup(
            config(),
            LocalServiceConfig {
                placement_polls: 0,
                ..LocalServiceConfig::default()
            },
        );

        acquirer.start_placement("queue-1", 8).unwrap();

        assert_eq!(acquirer.phase(), AcquirePhase::Fulfilled);
        assert_eq!(placement.describe_calls(), 0);
    }

    #[test]
    fn test_reserve_requires_session() {
        let (acquirer, _, _) = setup(config(), LocalServiceConfig::default());
        acquirer.prepare_player_sessions().unwrap();
        assert!(matches!(acquirer.reserve_player_slots(3), Err(AcquireError::NoSession)));
    }

    #[test]
    fn test_reserve_uses_offset_player_ids() {
        let (acquirer, _, placement) = setup(
            AcquirerConfig {
                start_player_id: 100,
                ..config()
            },
            LocalServiceConfig::default(),
        );
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();

        let reservations = acquirer.reserve_player_slots(3).unwrap();

        let ids: Vec<_> = reservations.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, ["DummyPlayer100", "DummyPlayer101", "DummyPlayer102"]);
    }

    #[test]
    fn test_reserve_must_stay_below_call_limit() {
        let (acquirer, _, placement) = setup(
            AcquirerConfig {
                max_players: 30,
                player_count: 25,
                ..config()
            },
            LocalServiceConfig::default(),
        );
        placement.insert_active_session("s", 30);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();

        assert!(matches!(acquirer.reserve_player_slots(25), Err(AcquireError::Config(_))));
        assert_eq!(acquirer.reserve_player_slots(24).unwrap().len(), 24);
    }

    #[test]
    fn test_prepare_rejects_oversized_pool() {
        let (acquirer, _, _) = setup(
            AcquirerConfig {
                max_players: 4,
                player_count: 5,
                ..config()
            },
            LocalServiceConfig::default(),
        );

        assert!(matches!(acquirer.prepare_player_sessions(), Err(AcquireError::Config(_))));
        assert_eq!(acquirer.player_count(), 0);
    }

    #[test]
    fn test_connect_pairs_in_order() {
        let (acquirer, engine, placement) = setup(config(), LocalServiceConfig::default());
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        let count = acquirer.prepare_player_sessions().unwrap();
        let reservations = acquirer.reserve_player_slots(count).unwrap();

        assert_eq!(acquirer.connect_players().unwrap(), 7);

        assert_eq!(engine.connects.lock().len(), 7);
        assert_eq!(acquirer.connected_count(), 7);
        acquirer.for_each_player(|index, player| {
            assert_eq!(player.handler().player_id(), Some(index as u64));
            let login = crate::player::login_frame(index as u64, &reservations[index].token).unwrap();
            assert_eq!(engine.sent_to(index as u32 + 1)[0], login);
        });
        assert_eq!(acquirer.phase(), AcquirePhase::Ready);
    }

    #[test]
    fn test_connect_aborts_without_rollback() {
        let (acquirer, engine, placement) = setup(config(), LocalServiceConfig::default());
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(7).unwrap();

        *engine.reject_connects_after.lock() = Some(3);

        let result = acquirer.connect_players();

        assert!(matches!(
            result,
            Err(AcquireError::PartialConnectFailure { issued: 3, total: 7, .. })
        ));
        assert_eq!(acquirer.connected_count(), 3);
        assert_eq!(acquirer.phase(), AcquirePhase::Failed);
    }

    #[test]
    fn test_disconnect_only_connected_players() {
        let (acquirer, engine, placement) = setup(config(), LocalServiceConfig::default());
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(7).unwrap();
        acquirer.connect_players().unwrap();

        acquirer.for_each_player(|index, player| {
            if index % 2 == 0 {
                player.disconnect();
            }
        });
        engine.disconnects.lock().clear();

        assert_eq!(acquirer.disconnect_players(), 3);
        assert_eq!(engine.disconnects.lock().len(), 3);
        assert_eq!(acquirer.connected_count(), 0);
        assert_eq!(acquirer.disconnect_players(), 0);
        assert_eq!(acquirer.phase(), AcquirePhase::Disconnected);
    }

    #[test]
    fn test_cancel_interrupts_create() {
        let engine = Arc::new(InlineEngine::default());
        let placement = Arc::new(LocalPlacementService::new(LocalServiceConfig {
            activation_polls: u32::MAX,
            ..LocalServiceConfig::default()
        }));
        let cancel = CancelToken::new();
        let acquirer = SessionAcquirer::new(
            "cancelled",
            AcquirerConfig {
                poll: PollPolicy::default(),
                ..config()
            },
            engine,
            placement,
            cancel.clone(),
        );

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });

        assert!(matches!(acquirer.create_session("alpha", 8), Err(AcquireError::Cancelled)));
        canceller.join().unwrap();
    }

    #[test]
    fn test_acquirers_sharing_a_service_keep_their_regions() {
        let placement = Arc::new(LocalPlacementService::new(LocalServiceConfig {
            placement_polls: 0,
            region: "eu-central-1".to_string(),
            ..LocalServiceConfig::default()
        }));
        let shared = Arc::clone(&placement) as Arc<dyn PlacementService>;
        let engine = Arc::new(InlineEngine::default());
        let placed = SessionAcquirer::new(
            "placed",
            AcquirerConfig {
                region: "us-east-1".to_string(),
                ..config()
            },
            Arc::clone(&engine),
            Arc::clone(&shared),
            CancelToken::new(),
        );
        let other = SessionAcquirer::new(
            "other",
            AcquirerConfig {
                region: "us-west-2".to_string(),
                ..config()
            },
            engine,
            shared,
            CancelToken::new(),
        );

        placed.start_placement("queue-1", 8).unwrap();
        other.start_placement("queue-1", 8).unwrap();
        placed.prepare_player_sessions().unwrap();
        placed.reserve_player_slots(2).unwrap();

        assert_eq!(placement.regions_of("start placement"), ["us-east-1", "us-west-2"]);
        assert_eq!(placement.regions_of("reserve player slots"), ["eu-central-1"]);
        assert_eq!(placed.region().as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_prepare_rejects_zero_buffers() {
        let (acquirer, _, _) = setup(
            AcquirerConfig {
                recv_buffer_size: 0,
                ..config()
            },
            LocalServiceConfig::default(),
        );

        assert!(matches!(acquirer.prepare_player_sessions(), Err(AcquireError::Config(_))));
        assert_eq!(acquirer.player_count(), 0);
    }

    #[test]
    fn test_connects_are_paced() {
        let delay = Duration::from_millis(15);
        let (acquirer, engine, placement) = setup(
            AcquirerConfig {
                connect_delay: delay,
                ..config()
            },
            LocalServiceConfig::default(),
        );
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        let count = acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(count).unwrap();

        let start = std::time::Instant::now();
        acquirer.connect_players().unwrap();
        let elapsed = start.elapsed();

        assert_eq!(engine.connects.lock().len(), 7);
        assert!(elapsed >= delay * 6, "{elapsed:?}");
    }

    #[test]
    fn test_first_connect_is_not_delayed() {
        let (acquirer, engine, placement) = setup(
            AcquirerConfig {
                player_count: 1,
                connect_delay: Duration::from_secs(2),
                ..config()
            },
            LocalServiceConfig::default(),
        );
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(1).unwrap();

        let start = std::time::Instant::now();
        acquirer.connect_players().unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.connects.lock().len(), 1);
    }

    #[test]
    fn test_drop_disconnects_players() {
        let (acquirer, engine, placement) = setup(config(), LocalServiceConfig::default());
        placement.insert_active_session("s", 8);
        acquirer.acquire().unwrap();
        acquirer.prepare_player_sessions().unwrap();
        acquirer.reserve_player_slots(7).unwrap();
        acquirer.connect_players().unwrap();

        let mut sessions = Vec::new();
        acquirer.for_each_player(|_, player| sessions.push(Arc::downgrade(player.session())));
        engine.disconnects.lock().clear();

        drop(acquirer);

        assert_eq!(engine.disconnects.lock().len(), 7);
        assert!(engine
            .disconnects
            .lock()
            .iter()
            .all(|(_, reason)| *reason == DisconnectReason::Active));
        assert!(sessions.iter().all(|weak| weak.upgrade().is_none()));
    }
}
