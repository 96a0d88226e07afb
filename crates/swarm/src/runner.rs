//! # Load Test Runner
//!
//! Runs `session_count` acquisitions on `worker_threads` orchestration
//! threads. Each acquisition goes end to end:
//!
//! ```text
//!   acquire ──▶ prepare ──▶ reserve ──▶ connect ──▶ traffic ──▶ disconnect
//!      │           │           │           │
//!      └───────────┴───────────┴───────────┴──▶ failure ──▶ disconnect
//! ```
//!
//! and sends one [`AcquisitionReport`] back over a channel. Acquisition is
//! thread-blocking, so one worker runs one acquisition at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use swarm_core::{CompletionEngine, SessionStatsSnapshot};
use swarm_placement::{Endpoint, PlacementService};

use crate::acquirer::{AcquirePhase, SessionAcquirer};
use crate::config::LoadTestConfig;
use crate::error::AcquireResult;
use crate::poll::CancelToken;

/// Outcome of one acquisition.
#[derive(Clone, Debug)]
pub struct AcquisitionReport {
    /// Acquisition index.
    pub index: usize,
    /// Session name used for creation.
    pub name: String,
    /// Negotiated session id.
    pub session_id: Option<String>,
    /// Negotiated endpoint.
    pub endpoint: Option<Endpoint>,
    /// Players in the pool.
    pub players: usize,
    /// Players still connected when the traffic phase ended.
    pub connected: usize,
    /// Disconnects issued during teardown.
    pub disconnected: usize,
    /// Summed traffic counters.
    pub stats: SessionStatsSnapshot,
    /// Phase the acquirer stopped in before teardown.
    pub phase: AcquirePhase,
    /// Why the acquisition failed, if it did.
    pub error: Option<String>,
    /// Wall time of the whole acquisition.
    pub elapsed: Duration,
}

impl AcquisitionReport {
    /// Returns true if every step succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// All reports of one run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Reports ordered by acquisition index.
    pub reports: Vec<AcquisitionReport>,
}

impl RunSummary {
    /// Returns the number of successful acquisitions.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    /// Returns the number of failed acquisitions.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// Returns the players connected at the end of their traffic phase.
    #[must_use]
    pub fn connected_players(&self) -> usize {
        self.reports.iter().map(|r| r.connected).sum()
    }

    /// Returns the summed traffic counters of every acquisition.
    #[must_use]
    pub fn totals(&self) -> SessionStatsSnapshot {
        let mut total = SessionStatsSnapshot::default();
        for report in &self.reports {
            total.accumulate(&report.stats);
        }
        total
    }
}

/// Drives a whole load test.
pub struct LoadTestRunner<E: CompletionEngine> {
    config: LoadTestConfig,
    engine: Arc<E>,
    placement: Arc<dyn PlacementService>,
    cancel: CancelToken,
}

impl<E: CompletionEngine> LoadTestRunner<E> {
    /// Creates a runner.
    #[must_use]
    pub fn new(config: LoadTestConfig, engine: Arc<E>, placement: Arc<dyn PlacementService>) -> Self {
        Self {
            config,
            engine,
            placement,
            cancel: CancelToken::new(),
        }
    }

    /// Returns a token that stops polls and traffic phases early.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs every acquisition and blocks until all have reported.
    pub fn run(&self) -> AcquireResult<RunSummary> {
        self.config.validate()?;

        let count = self.config.runner.session_count;
        let workers = self.config.runner.worker_threads.min(count.max(1));
        let (sender, receiver) = bounded(count.max(1));
        let next = Arc::new(AtomicUsize::new(0));

        tracing::info!(
            sessions = count,
            workers,
            players_per_session = self.config.players_per_session(),
            traffic = %self.config.traffic.mode,
            "load test starting"
        );

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job = Worker {
                config: self.config.clone(),
                engine: Arc::clone(&self.engine),
                placement: Arc::clone(&self.placement),
                cancel: self.cancel.clone(),
                next: Arc::clone(&next),
                sender: sender.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("swarm-worker-{worker}"))
                .spawn(move || job.run())?;
            handles.push(handle);
        }
        drop(sender);

        let mut reports: Vec<AcquisitionReport> = receiver.iter().collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        reports.sort_by_key(|r| r.index);
        let summary = RunSummary { reports };
        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            connected = summary.connected_players(),
            "load test finished"
        );
        Ok(summary)
    }
}

/// One orchestration thread.
struct Worker<E: CompletionEngine> {
    config: LoadTestConfig,
    engine: Arc<E>,
    placement: Arc<dyn PlacementService>,
    cancel: CancelToken,
    next: Arc<AtomicUsize>,
    sender: Sender<AcquisitionReport>,
}

impl<E: CompletionEngine> Worker<E> {
    fn run(self) {
        loop {
            let index = self.next.fetch_add(1, Ordering::AcqRel);
            if index >= self.config.runner.session_count || self.cancel.is_cancelled() {
                break;
            }

            let report = self.run_acquisition(index);
            if self.sender.send(report).is_err() {
                break;
            }
        }
    }

    fn run_acquisition(&self, index: usize) -> AcquisitionReport {
        let start = Instant::now();
        let acquirer = SessionAcquirer::new(
            format!("dummy-session-{index}"),
            self.config.acquirer_config(index),
            Arc::clone(&self.engine),
            Arc::clone(&self.placement),
            self.cancel.clone(),
        );

        let result = Self::bring_up(&acquirer);
        let phase = acquirer.phase();
        let mut connected = 0;

        match &result {
            Ok(()) => {
                let duration = Duration::from_secs(self.config.traffic.duration_secs);
                tracing::info!(index, session_id = ?acquirer.session_id(), ?duration, "traffic phase");
                self.cancel.wait_timeout(duration);
                connected = acquirer.connected_count();
            }
            Err(e) => {
                tracing::error!(index, error = %e, ?phase, "acquisition failed");
            }
        }

        let disconnected = acquirer.disconnect_players();
        AcquisitionReport {
            index,
            name: acquirer.name().to_string(),
            session_id: acquirer.session_id(),
            endpoint: acquirer.endpoint(),
            players: acquirer.player_count(),
            connected,
            disconnected,
            stats: acquirer.stats(),
            phase,
            error: result.err().map(|e| e.to_string()),
            elapsed: start.elapsed(),
        }
    }

    fn bring_up(acquirer: &SessionAcquirer<E>) -> AcquireResult<()> {
        acquirer.acquire()?;
        let players = acquirer.prepare_player_sessions()?;
        acquirer.reserve_player_slots(players)?;
        acquirer.connect_players()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_engine::InlineEngine;
    use swarm_placement::{LocalPlacementService, LocalServiceConfig};

    fn quick_config(sessions: usize, workers: usize) -> LoadTestConfig {
        let mut config = LoadTestConfig::default();
        config.placement.poll_interval_ms = 1;
        config.traffic.connect_delay_ms = 0;
        config.traffic.duration_secs = 0;
        config.runner.session_count = sessions;
        config.runner.worker_threads = workers;
        config.session.send_buffer_size = 1024;
        config.session.recv_buffer_size = 1024;
        config
    }

    fn runner(config: LoadTestConfig, service: LocalServiceConfig) -> LoadTestRunner<InlineEngine> {
        LoadTestRunner::new(
            config,
            Arc::new(InlineEngine::default()),
            Arc::new(LocalPlacementService::new(service)),
        )
    }

    #[test]
    fn test_every_acquisition_reports() {
        let summary = runner(quick_config(3, 2), LocalServiceConfig::default()).run().unwrap();

        assert_eq!(summary.reports.len(), 3);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.connected_players(), 21);
        let indices: Vec<_> = summary.reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(summary.reports.iter().all(|r| r.disconnected == 7));
        assert!(summary.totals().bytes_sent > 0);
    }

    #[test]
    fn test_failed_acquisition_is_reported() {
        let mut config = quick_config(1, 1);
        config.placement.poll_max_attempts = Some(2);
        let summary = runner(
            config,
            LocalServiceConfig {
                activation_polls: 100,
                ..LocalServiceConfig::default()
            },
        )
        .run()
        .unwrap();

        assert_eq!(summary.failed(), 1);
        let report = &summary.reports[0];
        assert_eq!(report.phase, AcquirePhase::Failed);
        assert!(report.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.connected, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        let mut config = quick_config(1, 1);
        config.session.reserved_slot_margin = 8;
        assert!(runner(config, LocalServiceConfig::default()).run().is_err());
    }

    #[test]
    fn test_cancelled_run_starts_nothing() {
        let runner = runner(quick_config(4, 2), LocalServiceConfig::default());
        runner.cancel_token().cancel();

        let summary = runner.run().unwrap();
        assert!(summary.reports.is_empty());
    }
}
