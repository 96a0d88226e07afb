//! # SWARM - Dummy Clients
//!
//! Emulates many concurrent game clients to load-test a multiplayer backend.
//!
//! ## Architecture
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │                        LoadTestRunner                          │
//!  │   worker thread ─┐  worker thread ─┐       (blocking)          │
//!  │                  ▼                 ▼                           │
//!  │          SessionAcquirer    SessionAcquirer   ──▶ PlacementService
//!  │           │ players[0..n]    │ players[0..n]                   │
//!  └───────────┼──────────────────┼─────────────────────────────────┘
//!              ▼                  ▼
//!         PlayerSession ... PlayerSession   (swarm_core::Session)
//!              │                  │
//!              └──── CompletionEngine worker threads ────▶ game server
//! ```
//!
//! - **SessionAcquirer**: negotiates a remote session (find, create or
//!   placement queue), reserves player slots and drives bulk connect and
//!   disconnect under one lock
//! - **PlayerSession**: logs in with its reservation token, then echoes or
//!   drains traffic
//! - **Poller**: fixed-interval status polling with deadline, attempt limit
//!   and cancellation
//! - **LoadTestRunner**: runs acquisitions on worker threads and collects
//!   reports

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod acquirer;
pub mod config;
pub mod error;
pub mod player;
pub mod poll;
pub mod runner;

#[cfg(test)]
mod test_engine;

// Re-exports for convenience
pub use acquirer::{AcquirePhase, AcquirerConfig, SessionAcquirer, DEFAULT_SESSION_FILTER};
pub use config::LoadTestConfig;
pub use error::{AcquireError, AcquireResult};
pub use player::{PlayerHandler, PlayerSession, TrafficMode};
pub use poll::{CancelToken, PollOutcome, PollPolicy, Poller};
pub use runner::{AcquisitionReport, LoadTestRunner, RunSummary};
