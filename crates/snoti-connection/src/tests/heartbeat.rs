//! Heartbeat cadence and recovery from silent brokers.

use super::{TestClient, WAIT};
use crate::testing::fast_timings;
use crate::{ClientTimings, ConnectionState};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_pings_are_sent_each_interval() {
    let mut harness = TestClient::new(fast_timings());
    harness.start();
    let mut session = harness.broker.next_session(WAIT).await.expect("session");
    session.accept_login(WAIT).await.expect("login_req");

    for _ in 0..3 {
        let ping = session.recv_cmd("ping", WAIT).await.expect("ping");
        assert_eq!(ping, serde_json::json!({"cmd": "ping"}));
        session.pong().await.unwrap();
    }
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_silent_broker_is_redialed() {
    let mut harness = TestClient::new(fast_timings());
    harness.start();
    let mut first = harness.broker.next_session(WAIT).await.expect("first session");
    first.accept_login(WAIT).await.expect("login_req");

    assert!(first.closed(WAIT).await, "silent session must be torn down");

    let mut second = harness.broker.next_session(WAIT).await.expect("second session");
    second.accept_login(WAIT).await.expect("login_req");
    assert!(harness.wait_for_state(ConnectionState::Connected, WAIT).await);
    assert_eq!(harness.transport.dial_count(), 2);
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_pongs_keep_session_alive() {
    let mut harness = TestClient::new(fast_timings());
    harness.start();
    let mut session = harness.broker.next_session(WAIT).await.expect("session");
    session.accept_login(WAIT).await.expect("login_req");

    // Several heartbeat timeouts' worth of answered pings.
    let until = Instant::now() + Duration::from_millis(800);
    while Instant::now() < until {
        if session.recv_cmd("ping", Duration::from_millis(200)).await.is_some() {
            session.pong().await.unwrap();
        }
    }

    assert_eq!(harness.client.state(), ConnectionState::Connected);
    assert_eq!(harness.transport.dial_count(), 1);
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_events_do_not_count_as_heartbeat() {
    let mut harness = TestClient::new(fast_timings());
    harness.start();
    let mut first = harness.broker.next_session(WAIT).await.expect("first session");
    first.accept_login(WAIT).await.expect("login_req");

    for i in 0..8 {
        first
            .push_event(&format!("m{i}"), i.into(), "device.online", serde_json::json!({}))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(harness.broker.next_session(WAIT).await.is_some());
    assert!(harness.stop(WAIT).await);
}

#[tokio::test(start_paused = true)]
async fn test_default_timings_redial_after_a_minute_of_silence() {
    let mut harness = TestClient::new(ClientTimings::default());
    harness.start();

    let mut first = harness
        .broker
        .next_session(Duration::from_secs(5))
        .await
        .expect("first session");
    first.accept_login(Duration::from_secs(5)).await.expect("login_req");
    assert!(
        harness
            .wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
            .await
    );
    let connected_at = Instant::now();

    assert!(first.closed(Duration::from_secs(120)).await);
    let silent_for = connected_at.elapsed();
    // The 60 s tick sees exactly 60 s of silence, which is not past the
    // timeout, so the 75 s tick is the one that drops the session.
    assert!(silent_for >= Duration::from_millis(74_500), "dropped after {silent_for:?}");
    assert!(silent_for <= Duration::from_secs(76), "dropped after {silent_for:?}");

    let mut second = harness
        .broker
        .next_session(Duration::from_secs(30))
        .await
        .expect("second session");
    second.accept_login(Duration::from_secs(5)).await.expect("login_req");
    assert!(
        harness
            .wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
            .await
    );
    assert!(harness.stop(Duration::from_secs(5)).await);
}
