//! Which inbound frames reach callers, and how outbound frames leave.

use super::{TestClient, WAIT};
use crate::testing::fast_timings;
use crate::{Connection, ConnectionState, QUEUE_CAPACITY};
use serde_json::{json, Value};
use snoti_protocol::{build_ack, encode, AckRequest, DeliveryId};
use std::time::Duration;

async fn connected() -> (TestClient, crate::testing::BrokerSession) {
    let mut harness = TestClient::new(fast_timings());
    harness.start();
    let mut session = harness.broker.next_session(WAIT).await.expect("session");
    session.accept_login(WAIT).await.expect("login_req");
    assert!(harness.wait_for_state(ConnectionState::Connected, WAIT).await);
    (harness, session)
}

fn msg_id(frame: &[u8]) -> String {
    let value: Value = serde_json::from_slice(frame).unwrap();
    value["msg_id"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_only_deliveries_are_queued() {
    let (mut harness, mut session) = connected().await;

    session.pong().await.unwrap();
    session
        .send(&json!({"cmd": "invalid_msg", "error_code": 4001, "msg": "bad frame"}))
        .await
        .unwrap();
    session.send_raw(b"garbage that is not json\n").await.unwrap();
    session.send_raw(b"\n   \n").await.unwrap();
    session.send(&json!({"msg_id": "no-cmd"})).await.unwrap();
    session
        .push_event("m1", json!(42), "device.status.kv", json!({"Switch": 1}))
        .await
        .unwrap();

    let frame = harness.read_within(WAIT).await.expect("event");
    let value: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(value["cmd"], "event_push");
    assert_eq!(value["msg_id"], "m1");
    assert_eq!(value["data"]["Switch"], 1);

    assert!(harness.read_within(Duration::from_millis(100)).await.is_none());
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let (mut harness, mut session) = connected().await;

    for i in 0..10 {
        session
            .push_event(&format!("m{i}"), json!(i), "device.online", json!({}))
            .await
            .unwrap();
    }

    for i in 0..10 {
        let frame = harness.read_within(WAIT).await.expect("event");
        assert_eq!(msg_id(&frame), format!("m{i}"));
    }
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_ingress_overflow_drops_oldest() {
    let (mut harness, mut session) = connected().await;
    let total = QUEUE_CAPACITY + 2;

    for i in 0..total {
        session
            .push_event(&format!("m{i}"), json!(i), "device.online", json!({}))
            .await
            .unwrap();
    }

    let deadline = tokio::time::Instant::now() + WAIT;
    while harness.client.pending_inbound() < QUEUE_CAPACITY
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the reader finish the frames past capacity.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.client.pending_inbound(), QUEUE_CAPACITY);

    let mut ids = Vec::new();
    while let Some(frame) = harness.read_within(Duration::from_millis(100)).await {
        ids.push(msg_id(&frame));
    }
    assert_eq!(ids.len(), QUEUE_CAPACITY);
    assert_eq!(ids.first().map(String::as_str), Some("m2"));
    assert_eq!(ids.last().cloned(), Some(format!("m{}", total - 1)));
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_written_ack_reaches_broker() {
    let (mut harness, mut session) = connected().await;

    session
        .push_event("m1", json!(42), "device.status.kv", json!({"Switch": 1}))
        .await
        .unwrap();
    let frame = harness.read_within(WAIT).await.expect("event");
    harness.client.write(build_ack(&frame));

    let ack = session.recv_cmd("event_ack", WAIT).await.expect("ack");
    assert_eq!(ack, json!({"cmd": "event_ack", "msg_id": "m1", "delivery_id": 42}));
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_frames_written_while_offline_are_sent_after_login() {
    let mut harness = TestClient::new(fast_timings());
    harness
        .client
        .write(encode(&AckRequest::new("early", DeliveryId::from("d-1"))));
    harness.start();

    let mut session = harness.broker.next_session(WAIT).await.expect("session");
    session.accept_login(WAIT).await.expect("login_req");

    let ack = session.recv_cmd("event_ack", WAIT).await.expect("queued ack");
    assert_eq!(ack["msg_id"], "early");
    assert_eq!(ack["delivery_id"], "d-1");
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_queued_frames_survive_a_redial() {
    let (mut harness, first) = connected().await;
    drop(first);

    let mut second = harness.broker.next_session(WAIT).await.expect("second session");
    harness
        .client
        .write(encode(&AckRequest::new("after-redial", DeliveryId::from(7))));
    second.accept_login(WAIT).await.expect("login_req");

    let ack = second.recv_cmd("event_ack", WAIT).await.expect("ack");
    assert_eq!(ack["msg_id"], "after-redial");
    assert!(harness.stop(WAIT).await);
}

#[tokio::test]
async fn test_event_with_null_fields_is_still_delivered() {
    let (mut harness, mut session) = connected().await;

    session
        .send(&json!({
            "cmd": "event_push",
            "msg_id": "m1",
            "delivery_id": 42,
            "event_type": null,
            "msg": null,
            "mac": null,
            "did": 7,
            "data": {"Switch": 1}
        }))
        .await
        .unwrap();
    session
        .send(&json!({"cmd": "invalid_msg", "error_code": "4001", "msg": null}))
        .await
        .unwrap();
    session
        .push_event("m2", json!(43), "device.online", json!({}))
        .await
        .unwrap();

    let first = harness.read_within(WAIT).await.expect("odd event");
    assert_eq!(msg_id(&first), "m1");
    let second = harness.read_within(WAIT).await.expect("next event");
    assert_eq!(msg_id(&second), "m2");
    assert!(harness.read_within(Duration::from_millis(100)).await.is_none());

    harness.client.write(build_ack(&first));
    let ack = session.recv_cmd("event_ack", WAIT).await.expect("event_ack");
    assert_eq!(ack["msg_id"], "m1");
    assert_eq!(ack["delivery_id"], 42);
    assert!(harness.stop(WAIT).await);
}
