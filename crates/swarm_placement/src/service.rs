//! # Placement Service Contract
//!
//! Blocking calls into the matchmaking / session-hosting backend. Callers run
//! these from orchestration threads, never from completion threads.
//!
//! Every call names the region it targets. A service shared between several
//! callers keeps no "current region"; each caller owns its own.

use crate::error::PlacementResult;
use crate::types::{
    CreateSessionRequest, PlacementDescriptor, PlacementRequest, PlayerReservation, SearchRequest,
    SessionDescriptor, SessionStatus,
};

/// Hard limit on player ids per reservation call.
pub const MAX_PLAYER_SESSIONS_PER_CALL: usize = 25;

/// A session-placement backend.
pub trait PlacementService: Send + Sync {
    /// Creates a session. The session usually starts out `Activating`.
    fn create_session(&self, region: &str, request: &CreateSessionRequest) -> PlacementResult<SessionDescriptor>;

    /// Returns the current status of a session.
    fn describe_session_status(&self, region: &str, session_id: &str) -> PlacementResult<SessionStatus>;

    /// Searches for sessions matching a filter expression.
    fn search_sessions(&self, region: &str, request: &SearchRequest) -> PlacementResult<Vec<SessionDescriptor>>;

    /// Reserves one slot per player id, returned in request order.
    fn reserve_player_slots(
        &self,
        region: &str,
        session_id: &str,
        player_ids: &[String],
    ) -> PlacementResult<Vec<PlayerReservation>>;

    /// Queues a placement.
    fn start_placement(&self, region: &str, request: &PlacementRequest) -> PlacementResult<PlacementDescriptor>;

    /// Returns the current state of a placement.
    fn describe_placement(&self, region: &str, placement_id: &str) -> PlacementResult<PlacementDescriptor>;

    /// Maximum player ids accepted by one reservation call.
    fn max_players_per_call(&self) -> usize {
        MAX_PLAYER_SESSIONS_PER_CALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlacementError;

    /// Answers nothing; only the provided methods are exercised.
    struct Offline;

    impl PlacementService for Offline {
        fn create_session(&self, _: &str, _: &CreateSessionRequest) -> PlacementResult<SessionDescriptor> {
            Err(PlacementError::action("create session", "offline"))
        }

        fn describe_session_status(&self, _: &str, id: &str) -> PlacementResult<SessionStatus> {
            Err(PlacementError::RemoteDescribe(id.to_string()))
        }

        fn search_sessions(&self, _: &str, _: &SearchRequest) -> PlacementResult<Vec<SessionDescriptor>> {
            Ok(Vec::new())
        }

        fn reserve_player_slots(&self, _: &str, id: &str, _: &[String]) -> PlacementResult<Vec<PlayerReservation>> {
            Err(PlacementError::NotFound(id.to_string()))
        }

        fn start_placement(&self, _: &str, _: &PlacementRequest) -> PlacementResult<PlacementDescriptor> {
            Err(PlacementError::action("start placement", "offline"))
        }

        fn describe_placement(&self, _: &str, id: &str) -> PlacementResult<PlacementDescriptor> {
            Err(PlacementError::RemoteDescribe(id.to_string()))
        }
    }

    #[test]
    fn test_provided_methods() {
        let service: &dyn PlacementService = &Offline;
        assert_eq!(service.max_players_per_call(), MAX_PLAYER_SESSIONS_PER_CALL);
        assert!(service
            .describe_session_status("us-east-1", "gsess-1")
            .unwrap_err()
            .is_describe());
    }
}
