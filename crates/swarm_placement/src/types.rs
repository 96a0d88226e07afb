//! # Placement Value Types
//!
//! Descriptors and requests exchanged with a placement service.

use std::net::{IpAddr, SocketAddr};

use crate::error::{PlacementError, PlacementResult};

/// Fleet id used when running against a local fleet instead of an alias.
pub const LOCAL_ALIAS: &str = "TEST_LOCAL";

/// Status of a remote game session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Being started by the fleet.
    Activating,
    /// Accepting players.
    Active,
    /// Failed to start.
    Error,
    /// Shut down.
    Terminated,
}

impl SessionStatus {
    /// Returns true if the session can never become active.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Error | Self::Terminated)
    }
}

/// Status of a queued placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlacementStatus {
    /// Waiting in the queue.
    Pending,
    /// A session was placed.
    Fulfilled,
    /// Cancelled before it was placed.
    Cancelled,
    /// The queue gave up.
    TimedOut,
}

impl PlacementStatus {
    /// Returns true if the placement will never be fulfilled.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

/// Network endpoint of a game server process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// IP address as reported by the service.
    pub ip_address: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
        }
    }

    /// Parses the endpoint into a socket address.
    pub fn socket_addr(&self) -> PlacementResult<SocketAddr> {
        self.ip_address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|_| PlacementError::InvalidEndpoint {
                address: self.ip_address.clone(),
                port: self.port,
            })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip_address, self.port)
    }
}

/// A remote game session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Service-assigned session id.
    pub session_id: String,
    /// Where players connect.
    pub endpoint: Endpoint,
    /// Current status.
    pub status: SessionStatus,
    /// Players currently holding reservations.
    pub player_count: usize,
    /// Maximum players.
    pub max_players: usize,
}

/// A queued placement request and, once fulfilled, its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementDescriptor {
    /// Caller-chosen placement id.
    pub placement_id: String,
    /// Current status.
    pub status: PlacementStatus,
    /// Placed session id, when fulfilled.
    pub session_id: Option<String>,
    /// Placed session endpoint, when fulfilled.
    pub endpoint: Option<Endpoint>,
    /// Region the session was placed in, when fulfilled.
    pub region: Option<String>,
}

/// Where new sessions are created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FleetOrAlias {
    /// A fleet id.
    Fleet(String),
    /// An alias resolving to a fleet.
    Alias(String),
}

impl FleetOrAlias {
    /// Resolves the configured alias for a session name.
    ///
    /// The [`LOCAL_ALIAS`] alias maps to the local fleet `fleet-<name>`.
    #[must_use]
    pub fn for_session(alias: &str, session_name: &str) -> Self {
        if alias == LOCAL_ALIAS {
            Self::Fleet(format!("fleet-{session_name}"))
        } else {
            Self::Alias(alias.to_string())
        }
    }
}

/// Parameters of a create-session call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateSessionRequest {
    /// Session name.
    pub name: String,
    /// Maximum players.
    pub max_players: usize,
    /// Fleet or alias to create on.
    pub target: FleetOrAlias,
}

/// Parameters of a search call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    /// Alias to search on.
    pub alias: String,
    /// Service filter expression.
    pub filter: String,
    /// Maximum results.
    pub limit: usize,
}

/// Parameters of a start-placement call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementRequest {
    /// Queue to place through.
    pub queue_name: String,
    /// Maximum players.
    pub max_players: usize,
    /// Caller-chosen unique placement id.
    pub placement_id: String,
}

/// One player's reservation in a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerReservation {
    /// Player the slot was reserved for.
    pub player_id: String,
    /// Opaque token presented to the game server.
    pub token: String,
}
