//! Session notifications.

use super::{DisconnectReason, Session};
use crate::engine::CompletionEngine;

/// Receives a session's notifications.
///
/// Every callback runs on whichever thread delivered the triggering
/// completion, with no session lock held. Callbacks may post sends, read the
/// receive buffer and request a disconnect.
pub trait SessionHandler: Send + Sync + Sized + 'static {
    /// The connect handshake finished and the first receive is armed.
    fn on_connect<E: CompletionEngine>(&self, _session: &Session<Self, E>) {}

    /// `len` new bytes were appended to the receive buffer.
    fn on_read<E: CompletionEngine>(&self, _session: &Session<Self, E>, _len: usize) {}

    /// Teardown finished. Fires at most once per connection.
    fn on_disconnect<E: CompletionEngine>(
        &self,
        _session: &Session<Self, E>,
        _reason: DisconnectReason,
    ) {
    }

    /// The last logical reference was released. Fires exactly once.
    fn on_release<E: CompletionEngine>(&self, _session: &Session<Self, E>) {}
}
