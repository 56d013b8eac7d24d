//! Gateway connection tests against the mock platform
//!
//! Drive a bare `GatewayConnection` through handshakes, drops, zombie
//! detection, and close codes.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use chat_common::BotToken;
use chat_gateway::{
    ConnectionStatus, Dispatch, GatewayConnection, GatewayError, GatewayHandle, GatewayOptions, OpCode,
};
use integration_tests::{fixtures::*, wait_for_status, MockPlatform, TEST_TOKEN};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Heartbeat interval long enough to stay out of the way
const QUIET_HEARTBEAT_MS: u64 = 30_000;

struct Running {
    handle: GatewayHandle,
    dispatches: mpsc::UnboundedReceiver<Dispatch>,
    task: JoinHandle<Result<(), GatewayError>>,
}

fn connect(platform: &MockPlatform) -> Running {
    let mut options = GatewayOptions::new(platform.gateway_url(), BotToken::new(TEST_TOKEN).unwrap());
    options.backoff_base = Duration::from_millis(10);
    options.backoff_max = Duration::from_millis(50);
    options.max_reconnects = 3;

    let (connection, handle, dispatches) = GatewayConnection::new(options);
    Running {
        handle,
        dispatches,
        task: tokio::spawn(connection.run()),
    }
}

async fn finished(task: JoinHandle<Result<(), GatewayError>>) -> Result<(), GatewayError> {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("connection task did not finish")
        .expect("connection task panicked")
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_and_ready() {
    let mut platform = MockPlatform::start().await.unwrap();
    let mut running = connect(&platform);

    let mut peer = platform.next_peer().await.unwrap();
    let identify = peer
        .accept_identify(QUIET_HEARTBEAT_MS, ready("session-a", &[]))
        .await
        .unwrap();
    assert_eq!(identify.d["token"], TEST_TOKEN);
    assert_eq!(identify.d["intents"], 4609);

    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();
    let dispatch = running.dispatches.recv().await.unwrap();
    assert_eq!(dispatch.event, "READY");
    assert_eq!(dispatch.sequence, Some(1));
    assert_eq!(running.handle.session().session_id(), Some("session-a"));

    running.handle.close();
    assert_eq!(peer.expect_close().await.unwrap(), Some(1000));
    finished(running.task).await.unwrap();
    assert_eq!(running.handle.status(), ConnectionStatus::Terminated);
}

#[tokio::test]
async fn test_commands_flow_after_ready() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    let mut peer = platform.next_peer().await.unwrap();
    peer.accept_identify(QUIET_HEARTBEAT_MS, ready("s", &[])).await.unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    running
        .handle
        .send(OpCode::PresenceUpdate, json!({ "status": "idle", "afk": false }))
        .unwrap();
    let presence = peer.expect_op(OpCode::PresenceUpdate).await.unwrap();
    assert_eq!(presence.d["status"], "idle");

    running.handle.close();
    finished(running.task).await.unwrap();
}

// ============================================================================
// Close codes
// ============================================================================

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    let mut peer = platform.next_peer().await.unwrap();
    peer.hello(QUIET_HEARTBEAT_MS).unwrap();
    peer.expect_op(OpCode::Identify).await.unwrap();
    peer.close(4004).unwrap();

    let err = finished(running.task).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, GatewayError::FatalClose { code: 4004, .. }));

    let stats = running.handle.stats();
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.reconnects, 0);
    assert_eq!(running.handle.status(), ConnectionStatus::Terminated);
    platform.expect_no_peer(Duration::from_millis(300)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    let mut first = platform.next_peer().await.unwrap();
    first.accept_identify(QUIET_HEARTBEAT_MS, ready("old", &[])).await.unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    first.invalidate_session(false).unwrap();
    assert_eq!(first.expect_close().await.unwrap(), Some(1000));

    let mut second = platform.next_peer().await.unwrap();
    second.accept_identify(QUIET_HEARTBEAT_MS, ready("new", &[])).await.unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    let stats = running.handle.stats();
    assert_eq!(stats.identifies, 2);
    assert_eq!(stats.resumes, 0);

    running.handle.close();
    finished(running.task).await.unwrap();
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_resume_after_drop() {
    let mut platform = MockPlatform::start().await.unwrap();
    let mut running = connect(&platform);

    let mut first = platform.next_peer().await.unwrap();
    first.accept_identify(QUIET_HEARTBEAT_MS, ready("s1", &[])).await.unwrap();
    first.dispatch("GUILD_CREATE", guild(10, "g", &[])).unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();
    assert_eq!(running.dispatches.recv().await.unwrap().event, "READY");
    assert_eq!(running.dispatches.recv().await.unwrap().sequence, Some(2));

    first.hang_up();

    let mut second = platform.next_peer().await.unwrap();
    second.hello(QUIET_HEARTBEAT_MS).unwrap();
    let resume = second.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], "s1");
    assert_eq!(resume.d["seq"], 2);
    assert_eq!(resume.d["token"], TEST_TOKEN);

    second.resume_sequence_at(2);
    second.dispatch("RESUMED", json!({})).unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();
    let resumed = running.dispatches.recv().await.unwrap();
    assert_eq!(resumed.event, "RESUMED");
    assert_eq!(resumed.sequence, Some(3));

    let stats = running.handle.stats();
    assert_eq!(stats.identifies, 1);
    assert_eq!(stats.resumes, 1);
    assert_eq!(stats.reconnects, 1);

    running.handle.close();
    finished(running.task).await.unwrap();
}

#[tokio::test]
async fn test_reconnect_request_resumes() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    let mut first = platform.next_peer().await.unwrap();
    first.accept_identify(QUIET_HEARTBEAT_MS, ready("s1", &[])).await.unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    first.request_reconnect().unwrap();
    assert_eq!(first.expect_close().await.unwrap(), Some(4000));

    let mut second = platform.next_peer().await.unwrap();
    second.hello(QUIET_HEARTBEAT_MS).unwrap();
    second.expect_op(OpCode::Resume).await.unwrap();

    running.handle.close();
    finished(running.task).await.unwrap();
}

#[tokio::test]
async fn test_missed_ack_resumes_once() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    let mut first = platform.next_peer().await.unwrap();
    first.stop_acking();
    first.accept_identify(200, ready("s1", &[])).await.unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    // Second unacknowledged beat marks the connection dead
    assert_eq!(first.expect_close().await.unwrap(), Some(4000));
    assert!(first.heartbeats() >= 1);

    let mut second = platform.next_peer().await.unwrap();
    second.hello(QUIET_HEARTBEAT_MS).unwrap();
    let resume = second.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], "s1");
    second.resume_sequence_at(1);
    second.dispatch("RESUMED", json!({})).unwrap();
    wait_for_status(&running.handle, ConnectionStatus::Ready).await.unwrap();

    platform.expect_no_peer(Duration::from_millis(500)).await.unwrap();
    let stats = running.handle.stats();
    assert_eq!(stats.zombies, 1);
    assert_eq!(stats.resumes, 1);
    assert_eq!(stats.connects, 2);

    running.handle.close();
    finished(running.task).await.unwrap();
}

#[tokio::test]
async fn test_gives_up_after_max_reconnects() {
    let mut platform = MockPlatform::start().await.unwrap();
    let running = connect(&platform);

    // Every attempt is cut before the handshake completes
    for _ in 0..4 {
        let mut peer = platform.next_peer().await.unwrap();
        peer.hang_up();
    }

    let err = finished(running.task).await.unwrap_err();
    assert!(matches!(err, GatewayError::ReconnectsExhausted { .. }));
    assert_eq!(running.handle.stats().connects, 4);
}
