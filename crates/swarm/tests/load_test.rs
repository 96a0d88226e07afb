//! End-to-end tests: acquirers and the runner against a loopback game server
//! through the tokio completion engine.

use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use swarm::{
    AcquirePhase, AcquirerConfig, CancelToken, LoadTestConfig, LoadTestRunner, PollPolicy,
    SessionAcquirer, TrafficMode,
};
use swarm_core::{DisconnectReason, EngineConfig, TokioEngine};
use swarm_placement::{Endpoint, LocalPlacementService, LocalServiceConfig, PlacementService};

/// Logins seen by the game server, as (player id, token).
type Logins = Arc<Mutex<Vec<(u64, String)>>>;

/// Reads the login frame of every connection, then echoes.
fn spawn_game_server() -> (SocketAddr, Logins) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let logins: Logins = Arc::default();

    let seen = Arc::clone(&logins);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let seen = Arc::clone(&seen);
            thread::spawn(move || serve(stream, &seen));
        }
    });

    (addr, logins)
}

fn serve(mut stream: TcpStream, logins: &Logins) {
    let mut header = [0u8; 4];
    if stream.read_exact(&mut header).is_err() {
        return;
    }
    let len = usize::from(u16::from_le_bytes([header[0], header[1]]));
    let frame_type = u16::from_le_bytes([header[2], header[3]]);
    let mut payload = vec![0u8; len - 4];
    if frame_type != 1 || stream.read_exact(&mut payload).is_err() {
        return;
    }

    let player_id = u64::from_le_bytes(payload[..8].try_into().unwrap());
    let token = String::from_utf8(payload[8..].to_vec()).unwrap();
    logins.lock().push((player_id, token));

    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn engine() -> Arc<TokioEngine> {
    Arc::new(
        TokioEngine::new(EngineConfig {
            worker_threads: 2,
            connect_timeout: Duration::from_secs(2),
        })
        .unwrap(),
    )
}

fn placement(addr: SocketAddr) -> Arc<LocalPlacementService> {
    Arc::new(LocalPlacementService::new(LocalServiceConfig {
        endpoint: Endpoint::new(addr.ip().to_string(), addr.port()),
        activation_polls: 1,
        placement_polls: 1,
        ..LocalServiceConfig::default()
    }))
}

fn acquirer_config(traffic: TrafficMode) -> AcquirerConfig {
    AcquirerConfig {
        traffic,
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
            max_attempts: None,
        },
        connect_delay: Duration::from_millis(1),
        send_buffer_size: 4096,
        recv_buffer_size: 4096,
        ..AcquirerConfig::default()
    }
}

fn all_released(acquirer: &SessionAcquirer<TokioEngine>) -> bool {
    let mut released = true;
    acquirer.for_each_player(|_, player| released &= player.session().is_released());
    released
}

#[test]
fn test_players_log_in_with_their_reservations() {
    let (addr, logins) = spawn_game_server();
    let service = placement(addr);
    let acquirer = SessionAcquirer::new(
        "login-test",
        AcquirerConfig {
            start_player_id: 500,
            ..acquirer_config(TrafficMode::Silent)
        },
        engine(),
        Arc::clone(&service) as Arc<dyn PlacementService>,
        CancelToken::new(),
    );

    acquirer.acquire().unwrap();
    let players = acquirer.prepare_player_sessions().unwrap();
    let reservations = acquirer.reserve_player_slots(players).unwrap();
    assert_eq!(acquirer.connect_players().unwrap(), 7);

    assert!(wait_until(Duration::from_secs(5), || logins.lock().len() == 7));
    assert!(wait_until(Duration::from_secs(5), || acquirer.connected_count() == 7));

    let mut seen = logins.lock().clone();
    seen.sort();
    for (i, (player_id, token)) in seen.iter().enumerate() {
        assert_eq!(*player_id, 500 + i as u64);
        assert_eq!(token, &reservations[i].token);
        assert_eq!(reservations[i].player_id, format!("DummyPlayer{player_id}"));
    }

    assert_eq!(acquirer.disconnect_players(), 7);
    assert!(wait_until(Duration::from_secs(5), || all_released(&acquirer)));
    acquirer.for_each_player(|_, player| {
        assert_eq!(player.handler().last_disconnect_reason(), Some(DisconnectReason::Active));
    });
}

#[test]
fn test_echo_traffic_flows() {
    let (addr, _logins) = spawn_game_server();
    let acquirer = SessionAcquirer::new(
        "echo-test",
        acquirer_config(TrafficMode::Echo),
        engine(),
        placement(addr),
        CancelToken::new(),
    );

    acquirer.acquire().unwrap();
    let players = acquirer.prepare_player_sessions().unwrap();
    acquirer.reserve_player_slots(players).unwrap();
    acquirer.connect_players().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        let stats = acquirer.stats();
        stats.recvs_completed >= 7 && stats.bytes_received > 0
    }));

    acquirer.disconnect_players();
    assert!(wait_until(Duration::from_secs(5), || acquirer.connected_count() == 0));
}

#[test]
fn test_unreachable_server_releases_players() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let acquirer = SessionAcquirer::new(
        "refused-test",
        acquirer_config(TrafficMode::Echo),
        engine(),
        placement(closed),
        CancelToken::new(),
    );

    acquirer.acquire().unwrap();
    let players = acquirer.prepare_player_sessions().unwrap();
    acquirer.reserve_player_slots(players).unwrap();

    // Submissions succeed; the failures arrive as disconnects
    assert_eq!(acquirer.connect_players().unwrap(), 7);
    assert!(wait_until(Duration::from_secs(5), || all_released(&acquirer)));

    assert_eq!(acquirer.connected_count(), 0);
    assert_eq!(acquirer.disconnect_players(), 0);
    acquirer.for_each_player(|_, player| {
        assert_eq!(player.handler().last_disconnect_reason(), Some(DisconnectReason::ConnectError));
    });
}

#[test]
fn test_placement_path_end_to_end() {
    let (addr, logins) = spawn_game_server();
    let acquirer = SessionAcquirer::new(
        "placement-test",
        AcquirerConfig {
            match_queue: Some("dummy-queue".to_string()),
            ..acquirer_config(TrafficMode::Silent)
        },
        engine(),
        placement(addr),
        CancelToken::new(),
    );

    acquirer.acquire().unwrap();
    assert_eq!(acquirer.phase(), AcquirePhase::Fulfilled);
    assert_eq!(acquirer.region().as_deref(), Some("local"));

    let players = acquirer.prepare_player_sessions().unwrap();
    acquirer.reserve_player_slots(players).unwrap();
    acquirer.connect_players().unwrap();

    assert!(wait_until(Duration::from_secs(5), || logins.lock().len() == 7));
    acquirer.disconnect_players();
}

#[test]
fn test_runner_fills_sessions() {
    let (addr, logins) = spawn_game_server();

    let mut config = LoadTestConfig::default();
    config.session.start_player_id = 1;
    config.placement.poll_interval_ms = 5;
    config.placement.local_server = addr.to_string();
    config.traffic.mode = TrafficMode::Silent;
    config.traffic.connect_delay_ms = 1;
    config.traffic.duration_secs = 1;
    config.runner.session_count = 3;
    config.runner.worker_threads = 3;

    let runner = LoadTestRunner::new(config, engine(), placement(addr));
    let summary = runner.run().unwrap();

    assert_eq!(summary.succeeded(), 3);
    assert_eq!(summary.connected_players(), 21);

    let mut ids: Vec<u64> = logins.lock().iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..22).collect::<Vec<_>>());
}
