//! # Dummy Clients
//!
//! Acquires remote game sessions and fills them with simulated players.
//!
//! ```text
//! dummy_clients --config load.toml --sessions 4 --traffic echo
//! ```
//!
//! Placement runs through the in-process placement service, which hands out
//! `placement.local_server` as the endpoint of every session.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use swarm::{LoadTestConfig, LoadTestRunner, RunSummary, TrafficMode};
use swarm_core::{EngineConfig, TokioEngine};
use swarm_placement::{LocalPlacementService, LocalServiceConfig};
use tracing_subscriber::EnvFilter;

/// Dummy-client load tester.
#[derive(Parser, Debug)]
#[command(name = "dummy_clients", version, about = "Load-test a game backend with simulated players")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote sessions to acquire
    #[arg(long)]
    sessions: Option<usize>,

    /// Maximum players per session
    #[arg(long)]
    max_players: Option<usize>,

    /// Id of the first simulated player
    #[arg(long)]
    start_player_id: Option<u64>,

    /// Fleet alias (TEST_LOCAL for a local fleet)
    #[arg(long)]
    alias: Option<String>,

    /// Placement queue to acquire sessions through
    #[arg(long)]
    queue: Option<String>,

    /// Traffic mode: echo or silent
    #[arg(long)]
    traffic: Option<TrafficMode>,

    /// Seconds players stay connected
    #[arg(long)]
    duration: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut LoadTestConfig) {
        if let Some(sessions) = self.sessions {
            config.runner.session_count = sessions;
        }
        if let Some(max_players) = self.max_players {
            config.session.max_players = max_players;
        }
        if let Some(start) = self.start_player_id {
            config.session.start_player_id = start;
        }
        if let Some(alias) = &self.alias {
            config.placement.alias.clone_from(alias);
        }
        if let Some(queue) = &self.queue {
            config.placement.match_queue = Some(queue.clone());
        }
        if let Some(traffic) = self.traffic {
            config.traffic.mode = traffic;
        }
        if let Some(duration) = self.duration {
            config.traffic.duration_secs = duration;
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn print_summary(summary: &RunSummary, elapsed: Duration) {
    let totals = summary.totals();

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    DUMMY CLIENTS - RESULTS                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ SESSIONS ───────────────────────────────────────────────────────┐");
    println!("│ Acquired:           {}", summary.succeeded());
    println!("│ Failed:             {}", summary.failed());
    println!("│ Players Connected:  {}", summary.connected_players());
    println!("│ Wall Time:          {:.2} seconds", elapsed.as_secs_f64());
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ TRAFFIC ────────────────────────────────────────────────────────┐");
    println!("│ Bytes Sent:         {}", totals.bytes_sent);
    println!("│ Bytes Received:     {}", totals.bytes_received);
    println!("│ Sends Completed:    {}", totals.sends_completed);
    println!("│ Receives Completed: {}", totals.recvs_completed);
    println!("└──────────────────────────────────────────────────────────────────┘");

    for report in summary.reports.iter().filter(|r| !r.succeeded()) {
        println!(
            "  ✗ {} ({:?}): {}",
            report.name,
            report.phase,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = match &args.config {
        Some(path) => match LoadTestConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => LoadTestConfig::default(),
    };
    args.apply(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let endpoint = match config.local_endpoint() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::error!(error = %e, "invalid local server address");
            return ExitCode::FAILURE;
        }
    };

    let engine = match TokioEngine::new(EngineConfig {
        worker_threads: config.runner.engine_threads,
        connect_timeout: Duration::from_millis(config.runner.connect_timeout_ms),
    }) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "failed to start completion engine");
            return ExitCode::FAILURE;
        }
    };

    let placement = Arc::new(LocalPlacementService::new(LocalServiceConfig {
        endpoint,
        activation_polls: 1,
        placement_polls: 1,
        max_players_per_call: config.placement.max_player_sessions_per_call,
        region: config.placement.region.clone(),
    }));

    let start = std::time::Instant::now();
    let runner = LoadTestRunner::new(config, engine, placement);
    match runner.run() {
        Ok(summary) => {
            print_summary(&summary, start.elapsed());
            if summary.failed() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "load test aborted");
            ExitCode::FAILURE
        }
    }
}
