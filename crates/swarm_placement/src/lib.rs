//! # SWARM Placement
//!
//! The session-placement backend as seen by the dummy clients: create, find,
//! describe and place remote game sessions, and reserve per-player slots.
//!
//! ## Calls
//!
//! ```text
//!   create_session ──▶ describe_session_status (poll until Active)
//!   search_sessions
//!   start_placement ──▶ describe_placement (poll until Fulfilled)
//!   reserve_player_slots ──▶ [token, token, ...]
//! ```
//!
//! The hosted backend is consumed as a black box through [`PlacementService`].
//! [`LocalPlacementService`] runs the same contract in-process.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod local;
pub mod service;
pub mod types;

pub use error::{PlacementError, PlacementResult};
pub use local::{LocalPlacementService, LocalServiceConfig};
pub use service::{PlacementService, MAX_PLAYER_SESSIONS_PER_CALL};
pub use types::{
    CreateSessionRequest, Endpoint, FleetOrAlias, PlacementDescriptor, PlacementRequest,
    PlacementStatus, PlayerReservation, SearchRequest, SessionDescriptor, SessionStatus,
    LOCAL_ALIAS,
};
