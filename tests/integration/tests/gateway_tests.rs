//! Gateway integration tests
//!
//! Every scenario runs shards against scripted in-memory connections with the
//! clock paused, so heartbeat, identify spacing and backoff timings are exact.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{fixtures, eventually, Harness};
use shardline_core::ShardId;
use shardline_gateway::{
    Delivery, EventBus, GatewayEvent, GatewayMessage, IdentifyGate, OpCode, Session, SessionKind,
    SessionStore, ShardEvent, ShardManager, ShardState, SupervisorConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn only_shard() -> ShardId {
    ShardId::new(0, 1).unwrap()
}

// ============================================================================
// Session establishment
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_identify_reaches_ready() {
    let mut h = Harness::start(1);
    let shard = only_shard();

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::gateway_connect_url());

    server.hello();
    let identify = server.expect(OpCode::Identify).await;
    let payload = identify.as_identify().unwrap();
    assert_eq!(payload.token, fixtures::TOKEN);
    assert_eq!(payload.shard, shard);

    server.ready(shard, "session-a", 1);
    h.wait_for_state(shard, ShardState::Ready).await;

    let session = h.manager.sessions().get(shard);
    assert_eq!(session.session_id.as_deref(), Some("session-a"));
    assert_eq!(session.sequence, Some(1));
    assert_eq!(session.resume_url.as_deref(), Some(fixtures::RESUME_URL));

    assert_eq!(h.manager.gate().in_flight(), 0);
    assert_eq!(h.sink.sessions_started(shard), vec![SessionKind::Fresh]);
    assert_eq!(
        h.sink.transitions(shard),
        vec![
            ShardState::AwaitingIdentifySlot,
            ShardState::Connecting,
            ShardState::AwaitingHello,
            ShardState::Authenticating,
            ShardState::Ready,
        ]
    );

    let dispatches = h.sink.dispatches(shard);
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].event_type, "READY");
    assert_eq!(dispatches[0].payload["session_id"], "session-a");

    h.manager.shutdown().await;
    assert_eq!(server.expect_close().await, Some(1000));
    assert_eq!(h.manager.state(shard), Some(ShardState::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_session_alive() {
    let mut h = Harness::start(1);
    let (shard, server) = h.identify_ready("session-a", 1).await;

    sleep(Duration::from_millis(fixtures::HEARTBEAT_INTERVAL_MS * 5)).await;

    assert!(server.heartbeats() >= 4);
    assert_eq!(h.manager.state(shard), Some(ShardState::Ready));
    assert_eq!(h.transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_requested_heartbeat_answered() {
    let mut h = Harness::start(1);
    let (_, server) = h.identify_ready("session-a", 1).await;

    let before = server.heartbeats();
    server.send(&GatewayMessage::heartbeat(None));
    eventually(|| server.heartbeats() > before).await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_failures_are_retried() {
    let mut h = Harness::new(fixtures::supervisor_config());
    h.transport.fail_connects(2);
    h.manager.start(1).unwrap();

    let (shard, _server) = h.identify_ready("session-a", 1).await;

    assert_eq!(h.transport.connect_count(), 3);
    assert_eq!(h.manager.restart_count(shard), Some(0));
}

// ============================================================================
// Sequence handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_dispatches_dropped() {
    let mut h = Harness::start(1);
    let (shard, server) = h.identify_ready("session-a", 1).await;

    server.dispatch("MESSAGE_CREATE", 2, fixtures::message_create(2, "two"));
    server.dispatch("MESSAGE_CREATE", 3, fixtures::message_create(3, "three"));
    server.dispatch("MESSAGE_CREATE", 3, fixtures::message_create(3, "three again"));
    server.dispatch("MESSAGE_CREATE", 2, fixtures::message_create(2, "two again"));
    server.dispatch("MESSAGE_CREATE", 4, fixtures::message_create(4, "four"));

    eventually(|| h.sink.sequences(shard).len() == 4).await;
    // Let anything still in flight land before checking nothing else arrived
    sleep(Duration::from_millis(100)).await;

    assert_eq!(h.sink.sequences(shard), vec![1, 2, 3, 4]);
    assert_eq!(h.manager.sessions().sequence(shard), Some(4));
    let contents: Vec<_> = h
        .sink
        .dispatches(shard)
        .iter()
        .skip(1)
        .map(|d| d.payload["content"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(contents, vec!["two", "three", "four"]);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_before_ready_dropped() {
    let mut h = Harness::start(1);
    let shard = only_shard();

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;

    server.dispatch("GUILD_CREATE", 1, fixtures::guild_create(7));
    server.ready(shard, "session-a", 2);
    h.wait_for_state(shard, ShardState::Ready).await;

    assert_eq!(h.sink.sequences(shard), vec![2]);
    assert_eq!(h.transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_violations_force_reconnect() {
    let mut h = Harness::start(1);

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;

    for _ in 0..4 {
        server.send_raw("this is not json");
    }
    assert_eq!(server.expect_close().await, Some(4000));

    // No session was established, so the next connection identifies again
    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::gateway_connect_url());
    server.hello();
    server.expect(OpCode::Identify).await;
}

// ============================================================================
// Reconnect and resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hello_timeout_reconnects() {
    let mut h = Harness::start(1);

    let mut server = h.servers.next().await;
    let connected_at = Instant::now();
    assert_eq!(server.expect_close().await, Some(4000));
    assert!(connected_at.elapsed() >= fixtures::HELLO_TIMEOUT);

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_ready_reconnects() {
    let mut h = Harness::start(1);

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;
    let identified_at = Instant::now();

    // Heartbeats are acked, but READY never comes
    assert_eq!(server.expect_close().await, Some(4000));
    assert!(identified_at.elapsed() >= fixtures::READY_TIMEOUT);
    assert!(server.heartbeats() >= 1);

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_request_resumes_with_replay() {
    let mut h = Harness::start(1);
    let (shard, mut server) = h.identify_ready("session-a", 1).await;
    let ready_at = Instant::now();

    server.dispatch("MESSAGE_CREATE", 2, fixtures::message_create(2, "two"));
    server.dispatch("MESSAGE_CREATE", 3, fixtures::message_create(3, "three"));
    server.send(&GatewayMessage::reconnect());
    assert_eq!(server.expect_close().await, Some(4000));

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::resume_connect_url());
    server.hello();
    let resume = server.expect(OpCode::Resume).await.as_resume().unwrap();
    assert_eq!(resume.token, fixtures::TOKEN);
    assert_eq!(resume.session_id, "session-a");
    assert_eq!(resume.seq, 3);
    // Resumes skip the identify gate
    assert!(ready_at.elapsed() < fixtures::IDENTIFY_SPACING);

    server.dispatch("MESSAGE_CREATE", 3, fixtures::message_create(3, "three"));
    server.dispatch("MESSAGE_CREATE", 4, fixtures::message_create(4, "four"));
    server.resumed(5);
    h.wait_for_state(shard, ShardState::Ready).await;

    assert_eq!(h.sink.sequences(shard), vec![1, 2, 3, 4, 5]);
    assert_eq!(
        h.sink.sessions_started(shard),
        vec![SessionKind::Fresh, SessionKind::Resumed]
    );
    assert!(!h
        .sink
        .events(shard)
        .iter()
        .any(|e| matches!(e, ShardEvent::Discontinuity { .. })));
    assert_eq!(
        h.manager.sessions().get(shard).session_id.as_deref(),
        Some("session-a")
    );
}

#[tokio::test(start_paused = true)]
async fn test_resumable_invalid_session_resumes() {
    let mut h = Harness::start(1);
    let (_, mut server) = h.identify_ready("session-a", 1).await;

    server.send(&GatewayMessage::invalid_session(true));
    assert_eq!(server.expect_close().await, Some(4000));

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::resume_connect_url());
    server.hello();
    let resume = server.expect(OpCode::Resume).await.as_resume().unwrap();
    assert_eq!(resume.session_id, "session-a");
    assert_eq!(resume.seq, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_identifies_again() {
    let mut h = Harness::start(1);
    let (shard, mut server) = h.identify_ready("session-a", 1).await;
    let first_identify = Instant::now();

    server.dispatch("MESSAGE_CREATE", 2, fixtures::message_create(2, "two"));
    server.send(&GatewayMessage::invalid_session(false));
    assert_eq!(server.expect_close().await, Some(4000));

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::gateway_connect_url());
    assert_eq!(h.manager.sessions().get(shard), Session::default());

    server.hello();
    server.expect(OpCode::Identify).await;
    assert!(first_identify.elapsed() >= fixtures::IDENTIFY_SPACING);

    assert!(h.sink.events(shard).contains(&ShardEvent::Discontinuity {
        last_sequence: Some(2)
    }));

    server.ready(shard, "session-b", 1);
    h.wait_for_state(shard, ShardState::Ready).await;
    assert_eq!(
        h.sink.sessions_started(shard),
        vec![SessionKind::Fresh, SessionKind::Fresh]
    );
    assert_eq!(h.manager.sessions().sequence(shard), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_session_timeout_close_identifies_again() {
    let mut h = Harness::start(1);
    let (shard, server) = h.identify_ready("session-a", 1).await;

    server.dispatch("MESSAGE_CREATE", 2, fixtures::message_create(2, "two"));
    server.close(4009);

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::gateway_connect_url());
    server.hello();
    server.expect(OpCode::Identify).await;

    assert!(h.sink.events(shard).contains(&ShardEvent::Discontinuity {
        last_sequence: Some(2)
    }));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_resumes() {
    let mut h = Harness::start(1);
    let (_, server) = h.identify_ready("session-a", 1).await;

    server.drop_connection();

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::resume_connect_url());
    server.hello();
    server.expect(OpCode::Resume).await;
}

#[tokio::test(start_paused = true)]
async fn test_zombie_connection_reconnects() {
    let mut h = Harness::start(1);
    let (shard, mut server) = h.identify_ready("session-a", 1).await;

    server.stop_acking();
    let stopped_at = Instant::now();
    assert_eq!(server.expect_close().await, Some(4000));

    assert!(server.heartbeats() >= 1);
    assert!(stopped_at.elapsed() >= Duration::from_millis(fixtures::HEARTBEAT_INTERVAL_MS));

    let mut server = h.servers.next().await;
    assert_eq!(server.url(), fixtures::resume_connect_url());
    server.hello();
    server.expect(OpCode::Resume).await;
    server.resumed(2);
    h.wait_for_state(shard, ShardState::Ready).await;
}

// ============================================================================
// Fatal closes and supervision
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_fatal() {
    let mut h = Harness::start(1);
    let shard = only_shard();

    let mut server = h.servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;
    server.close(4004);

    h.wait_for_state(shard, ShardState::Closed).await;
    sleep(Duration::from_secs(120)).await;

    assert_eq!(h.transport.connect_count(), 1);
    assert_eq!(h.manager.restart_count(shard), Some(0));
    assert!(h
        .sink
        .events(shard)
        .iter()
        .any(|e| matches!(e, ShardEvent::Fatal { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_disallowed_intents_is_fatal() {
    let mut h = Harness::start(1);
    let (shard, server) = h.identify_ready("session-a", 1).await;

    server.close(4014);

    h.wait_for_state(shard, ShardState::Closed).await;
    assert_eq!(h.manager.sessions().get(shard), Session::default());
    assert_eq!(h.transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicked_shard_restarts() {
    let mut h = Harness::new(fixtures::supervisor_config());
    h.transport.panic_on_connect(1);
    h.manager.start(1).unwrap();

    let (shard, _server) = h.identify_ready("session-a", 1).await;

    assert_eq!(h.manager.restart_count(shard), Some(1));
    assert_eq!(h.transport.connect_count(), 2);
    assert_eq!(h.manager.gate().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_cap_closes_shard() {
    let h = Harness::new(SupervisorConfig {
        max_rapid_restarts: 2,
        restart_window: Duration::from_secs(60),
    });
    h.transport.panic_on_connect(10);
    h.manager.start(1).unwrap();
    let shard = only_shard();

    h.wait_for_state(shard, ShardState::Closed).await;

    assert_eq!(h.manager.restart_count(shard), Some(2));
    assert_eq!(h.transport.connect_count(), 3);
    assert!(matches!(
        h.sink.events(shard).last(),
        Some(ShardEvent::Fatal { .. })
    ));
}

// ============================================================================
// Multiple shards
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_identify_in_flight_at_a_time() {
    let mut h = Harness::start(2);

    let mut first = h.servers.next().await;
    first.hello();
    let first_shard = first.expect(OpCode::Identify).await.as_identify().unwrap().shard;

    // The slot is held until the first session is ready
    sleep(Duration::from_secs(30)).await;
    assert!(h.servers.try_next().is_none());
    assert_eq!(h.manager.gate().queued(), 1);

    first.ready(first_shard, "session-a", 1);

    let mut second = h.servers.next().await;
    second.hello();
    let second_shard = second.expect(OpCode::Identify).await.as_identify().unwrap().shard;
    assert_ne!(first_shard, second_shard);

    second.ready(second_shard, "session-b", 1);
    h.wait_for_state(second_shard, ShardState::Ready).await;

    let states = h.manager.states();
    assert_eq!(states.len(), 2);
    assert!(states.iter().all(|(_, s)| *s == ShardState::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_hung_connect_gives_up_identify_slot() {
    let mut h = Harness::new(fixtures::supervisor_config());
    h.transport.hang_connects(1);
    h.manager.start(2).unwrap();
    let started = Instant::now();

    // The stuck shard times out and the other shard takes the slot
    let (first, _first_server) = h.identify_ready("session-a", 1).await;
    assert!(started.elapsed() >= fixtures::CONNECT_TIMEOUT);

    let (second, _second_server) = h.identify_ready("session-b", 1).await;
    assert_ne!(first, second);

    assert_eq!(h.transport.connect_count(), 3);
    assert_eq!(h.manager.gate().in_flight(), 0);
    assert!(h
        .manager
        .states()
        .iter()
        .all(|(_, s)| *s == ShardState::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_every_shard() {
    let mut h = Harness::start(2);

    let mut first = h.servers.next().await;
    first.hello();
    first.expect(OpCode::Identify).await;

    h.manager.shutdown().await;

    assert_eq!(first.expect_close().await, Some(1000));
    assert!(h
        .manager
        .states()
        .iter()
        .all(|(_, s)| *s == ShardState::Closed));
    assert_eq!(h.manager.gate().in_flight(), 0);
    assert_eq!(h.manager.gate().queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_bus_delivers_in_order() {
    let (transport, mut servers) = integration_tests::MockGatewayTransport::new();
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let manager = ShardManager::with_parts(
        fixtures::shard_config(),
        fixtures::supervisor_config(),
        transport,
        Arc::new(bus),
        IdentifyGate::new(fixtures::gate_config()),
        SessionStore::new(),
    );
    manager.start(1).unwrap();
    let shard = only_shard();

    let mut server = servers.next().await;
    server.hello();
    server.expect(OpCode::Identify).await;
    server.ready(shard, "session-a", 1);
    server.dispatch("GUILD_CREATE", 2, fixtures::guild_create(7));

    let mut sequences = Vec::new();
    let mut started = None;
    while sequences.len() < 2 {
        match integration_tests::within(events.recv()).await {
            Some(Delivery::Event(GatewayEvent::Dispatch(dispatch))) => {
                assert_eq!(dispatch.shard, shard);
                sequences.push(dispatch.sequence);
            }
            Some(Delivery::Event(GatewayEvent::Shard {
                event: ShardEvent::SessionStarted { kind },
                ..
            })) => started = Some(kind),
            Some(Delivery::Event(_)) => {}
            Some(Delivery::Lagged(missed)) => panic!("subscriber lagged by {missed}"),
            None => panic!("bus closed"),
        }
    }

    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(started, Some(SessionKind::Fresh));

    manager.shutdown().await;
}
