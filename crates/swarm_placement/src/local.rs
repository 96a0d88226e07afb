//! # Local Placement Service
//!
//! In-process stand-in for a hosted placement backend.
//!
//! Every created or placed session points at one configured game-server
//! endpoint. Sessions report `Activating` for a configurable number of
//! describe calls before turning `Active`; placements stay `Pending` for a
//! configurable number of describe calls before being fulfilled. Failures
//! can be injected for describe and action calls. The region named by each
//! call is logged so callers can check which region they targeted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{PlacementError, PlacementResult};
use crate::service::{PlacementService, MAX_PLAYER_SESSIONS_PER_CALL};
use crate::types::{
    CreateSessionRequest, Endpoint, FleetOrAlias, PlacementDescriptor, PlacementRequest,
    PlacementStatus, PlayerReservation, SearchRequest, SessionDescriptor, SessionStatus,
    LOCAL_ALIAS,
};

/// Local service configuration.
#[derive(Clone, Debug)]
pub struct LocalServiceConfig {
    /// Endpoint every session points at.
    pub endpoint: Endpoint,
    /// Describe calls answered `Activating` before a session is `Active`.
    pub activation_polls: u32,
    /// Describe calls answered `Pending` before a placement is fulfilled.
    /// Zero fulfills placements immediately.
    pub placement_polls: u32,
    /// Player ids accepted per reservation call.
    pub max_players_per_call: usize,
    /// Region reported for placed sessions.
    pub region: String,
}

impl Default for LocalServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new("127.0.0.1", 7777),
            activation_polls: 2,
            placement_polls: 2,
            max_players_per_call: MAX_PLAYER_SESSIONS_PER_CALL,
            region: "local".to_string(),
        }
    }
}

/// Session record.
#[derive(Debug)]
struct LocalSession {
    descriptor: SessionDescriptor,
    /// Describe calls answered so far.
    describes: u32,
    /// Fleet or alias the session was created on.
    target: FleetOrAlias,
}

/// Placement record.
#[derive(Debug)]
struct LocalPlacement {
    descriptor: PlacementDescriptor,
    max_players: usize,
    /// Describe calls answered so far.
    describes: u32,
}

/// Mutable service state.
#[derive(Debug, Default)]
struct LocalState {
    sessions: HashMap<String, LocalSession>,
    placements: HashMap<String, LocalPlacement>,
    /// (call, region) in arrival order.
    calls: Vec<(&'static str, String)>,
}

/// In-process placement service.
#[derive(Debug)]
pub struct LocalPlacementService {
    config: LocalServiceConfig,
    state: Mutex<LocalState>,
    /// Makes every describe call fail.
    fail_describe: AtomicBool,
    /// Makes every create/search/reserve/place call fail.
    fail_actions: AtomicBool,
    /// Describe calls received.
    describe_calls: AtomicUsize,
}

impl LocalPlacementService {
    /// Creates an empty service.
    #[must_use]
    pub fn new(config: LocalServiceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LocalState::default()),
            fail_describe: AtomicBool::new(false),
            fail_actions: AtomicBool::new(false),
            describe_calls: AtomicUsize::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &LocalServiceConfig {
        &self.config
    }

    /// Makes describe calls fail (or succeed again).
    pub fn set_fail_describe(&self, fail: bool) {
        self.fail_describe.store(fail, Ordering::SeqCst);
    }

    /// Makes action calls fail (or succeed again).
    pub fn set_fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of describe calls received so far.
    #[must_use]
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Returns the regions named by every `call` received, in order.
    #[must_use]
    pub fn regions_of(&self, call: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(name, _)| *name == call)
            .map(|(_, region)| region.clone())
            .collect()
    }

    fn record(&self, call: &'static str, region: &str) {
        self.state.lock().calls.push((call, region.to_string()));
    }

    /// Returns the number of sessions known to the service.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Returns the fleet or alias a session was created on.
    #[must_use]
    pub fn session_target(&self, session_id: &str) -> Option<FleetOrAlias> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(|s| s.target.clone())
    }

    /// Adds an already-active session, as if another client had created it.
    pub fn insert_active_session(&self, name: &str, max_players: usize) -> SessionDescriptor {
        let mut state = self.state.lock();
        let descriptor = self.new_session(&mut state, FleetOrAlias::Alias(name.to_string()), max_players);
        if let Some(session) = state.sessions.get_mut(&descriptor.session_id) {
            session.descriptor.status = SessionStatus::Active;
            return session.descriptor.clone();
        }
        descriptor
    }

    /// Forces a session into `status`.
    pub fn set_session_status(&self, session_id: &str, status: SessionStatus) -> PlacementResult<()> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PlacementError::NotFound(session_id.to_string()))?;
        session.descriptor.status = status;
        Ok(())
    }

    /// Cancels a pending placement.
    pub fn cancel_placement(&self, placement_id: &str) -> PlacementResult<()> {
        let mut state = self.state.lock();
        let placement = state
            .placements
            .get_mut(placement_id)
            .ok_or_else(|| PlacementError::NotFound(placement_id.to_string()))?;
        placement.descriptor.status = PlacementStatus::Cancelled;
        Ok(())
    }

    fn check_action(&self, action: &'static str) -> PlacementResult<()> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(PlacementError::action(action, "injected failure"));
        }
        Ok(())
    }

    fn check_describe(&self) -> PlacementResult<()> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_describe.load(Ordering::SeqCst) {
            return Err(PlacementError::RemoteDescribe("injected failure".to_string()));
        }
        Ok(())
    }

    fn new_session(&self, state: &mut LocalState, target: FleetOrAlias, max_players: usize) -> SessionDescriptor {
        let descriptor = SessionDescriptor {
            session_id: format!("gsess-{}", Uuid::new_v4()),
            endpoint: self.config.endpoint.clone(),
            status: if self.config.activation_polls == 0 {
                SessionStatus::Active
            } else {
                SessionStatus::Activating
            },
            player_count: 0,
            max_players,
        };

        state.sessions.insert(
            descriptor.session_id.clone(),
            LocalSession {
                descriptor: descriptor.clone(),
                describes: 0,
                target,
            },
        );
        descriptor
    }

    /// Places a session for a placement and marks it fulfilled.
    fn fulfill(&self, state: &mut LocalState, placement_id: &str) -> Option<PlacementDescriptor> {
        let max_players = state.placements.get(placement_id)?.max_players;
        let mut session = self.new_session(state, FleetOrAlias::Fleet("queue".to_string()), max_players);
        session.status = SessionStatus::Active;
        if let Some(record) = state.sessions.get_mut(&session.session_id) {
            record.descriptor.status = SessionStatus::Active;
        }

        let placement = state.placements.get_mut(placement_id)?;
        placement.descriptor.status = PlacementStatus::Fulfilled;
        placement.descriptor.session_id = Some(session.session_id);
        placement.descriptor.endpoint = Some(session.endpoint);
        placement.descriptor.region = Some(self.config.region.clone());
        Some(placement.descriptor.clone())
    }
}

impl Default for LocalPlacementService {
    fn default() -> Self {
        Self::new(LocalServiceConfig::default())
    }
}

impl PlacementService for LocalPlacementService {
    fn create_session(&self, region: &str, request: &CreateSessionRequest) -> PlacementResult<SessionDescriptor> {
        self.record("create session", region);
        self.check_action("create session")?;

        let mut state = self.state.lock();
        let descriptor = self.new_session(&mut state, request.target.clone(), request.max_players);
        tracing::debug!(session_id = %descriptor.session_id, name = %request.name, "local session created");
        Ok(descriptor)
    }

    fn describe_session_status(&self, region: &str, session_id: &str) -> PlacementResult<SessionStatus> {
        self.record("describe session", region);
        self.check_describe()?;

        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PlacementError::RemoteDescribe(format!("no session {session_id}")))?;

        session.describes += 1;
        if session.descriptor.status == SessionStatus::Activating
            && session.describes >= self.config.activation_polls
        {
            session.descriptor.status = SessionStatus::Active;
        }
        Ok(session.descriptor.status)
    }

    fn search_sessions(&self, region: &str, request: &SearchRequest) -> PlacementResult<Vec<SessionDescriptor>> {
        self.record("search sessions", region);
        self.check_action("search sessions")?;
        if request.alias == LOCAL_ALIAS {
            return Err(PlacementError::action("search sessions", "not supported by a local fleet"));
        }

        // Only "no players yet and slots available" is understood
        let state = self.state.lock();
        let mut found: Vec<SessionDescriptor> = state
            .sessions
            .values()
            .map(|s| &s.descriptor)
            .filter(|d| {
                d.status == SessionStatus::Active && d.player_count == 0 && d.max_players > 0
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        found.truncate(request.limit);
        Ok(found)
    }

    fn reserve_player_slots(
        &self,
        region: &str,
        session_id: &str,
        player_ids: &[String],
    ) -> PlacementResult<Vec<PlayerReservation>> {
        self.record("reserve player slots", region);
        self.check_action("reserve player slots")?;
        if player_ids.len() > self.config.max_players_per_call {
            return Err(PlacementError::TooManyPlayers {
                requested: player_ids.len(),
                limit: self.config.max_players_per_call,
            });
        }

        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PlacementError::NotFound(session_id.to_string()))?;
        let descriptor = &mut session.descriptor;

        if descriptor.status != SessionStatus::Active {
            return Err(PlacementError::action("reserve player slots", "game session is not active"));
        }
        if descriptor.player_count + player_ids.len() > descriptor.max_players {
            return Err(PlacementError::action("reserve player slots", "game session is full"));
        }

        descriptor.player_count += player_ids.len();
        Ok(player_ids
            .iter()
            .map(|player_id| PlayerReservation {
                player_id: player_id.clone(),
                token: format!("psess-{}", Uuid::new_v4()),
            })
            .collect())
    }

    fn start_placement(&self, region: &str, request: &PlacementRequest) -> PlacementResult<PlacementDescriptor> {
        self.record("start placement", region);
        self.check_action("start placement")?;

        let mut state = self.state.lock();
        if state.placements.contains_key(&request.placement_id) {
            return Err(PlacementError::action("start placement", "placement id already used"));
        }

        state.placements.insert(
            request.placement_id.clone(),
            LocalPlacement {
                descriptor: PlacementDescriptor {
                    placement_id: request.placement_id.clone(),
                    status: PlacementStatus::Pending,
                    session_id: None,
                    endpoint: None,
                    region: None,
                },
                max_players: request.max_players,
                describes: 0,
            },
        );

        if self.config.placement_polls == 0 {
            return self
                .fulfill(&mut state, &request.placement_id)
                .ok_or_else(|| PlacementError::NotFound(request.placement_id.clone()));
        }

        tracing::debug!(placement_id = %request.placement_id, queue = %request.queue_name, "placement queued");
        Ok(state.placements[&request.placement_id].descriptor.clone())
    }

    fn describe_placement(&self, region: &str, placement_id: &str) -> PlacementResult<PlacementDescriptor> {
        self.record("describe placement", region);
        self.check_describe()?;

        let mut state = self.state.lock();
        let placement = state
            .placements
            .get_mut(placement_id)
            .ok_or_else(|| PlacementError::RemoteDescribe(format!("no placement {placement_id}")))?;

        placement.describes += 1;
        let ready = placement.descriptor.status == PlacementStatus::Pending
            && placement.describes >= self.config.placement_polls;
        let current = placement.descriptor.clone();

        if ready {
            return self
                .fulfill(&mut state, placement_id)
                .ok_or_else(|| PlacementError::RemoteDescribe(format!("no placement {placement_id}")));
        }
        Ok(current)
    }

    fn max_players_per_call(&self) -> usize {
        self.config.max_players_per_call
    }
}
