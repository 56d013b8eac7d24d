//! Client end-to-end tests
//!
//! A full `Client` against the mock platform: discovery, event routing
//! through the cache, REST actions, and lifecycle.
//!
//! Run with: cargo test -p integration-tests --test client_tests

use std::time::Duration;

use chat_client::{Client, ClientError, ClientState, Event};
use chat_core::{Channel, Guild, Snowflake, User};
use chat_gateway::{ConnectionStatus, OpCode};
use integration_tests::{
    fixtures::*, next_event, wait_for_status, GatewayPeer, MockPlatform, MockReply, STEP_TIMEOUT,
};
use serde_json::json;

const QUIET_HEARTBEAT_MS: u64 = 30_000;

/// Start a client and complete its handshake
async fn connected(platform: &mut MockPlatform) -> (Client, GatewayPeer) {
    let client = Client::new(platform.client_config().unwrap()).unwrap();
    client.start().await.unwrap();

    let mut peer = platform.next_peer().await.unwrap();
    peer.accept_identify(QUIET_HEARTBEAT_MS, ready("session", &[10]))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.wait_until_ready())
        .await
        .unwrap()
        .unwrap();
    (client, peer)
}

// ============================================================================
// Discovery and lifecycle
// ============================================================================

#[tokio::test]
async fn test_discovers_gateway_over_rest() {
    let mut platform = MockPlatform::start().await.unwrap();
    let mut config = platform.client_config().unwrap();
    config.gateway.url = None;
    platform.reply("GET /gateway/bot", 200, gateway_bot(&platform.gateway_url()));

    let client = Client::new(config).unwrap();
    client.start().await.unwrap();
    let mut peer = platform.next_peer().await.unwrap();
    peer.accept_identify(QUIET_HEARTBEAT_MS, ready("s", &[])).await.unwrap();
    client.wait_until_ready().await.unwrap();

    assert_eq!(platform.calls(), vec!["GET /gateway/bot"]);
    assert_eq!(client.current_user().unwrap().read().id, Snowflake::new(SELF_USER_ID));
    client.stop().await;
}

#[tokio::test]
async fn test_stop_closes_normally_and_is_final() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;

    client.stop().await;
    assert_eq!(peer.expect_close().await.unwrap(), Some(1000));
    assert_eq!(client.state(), ClientState::Terminated);
    assert_eq!(client.gateway_status(), Some(ConnectionStatus::Terminated));
    assert!(matches!(client.start().await, Err(ClientError::Terminated)));
    assert!(client.wait().await.is_ok());
}

#[tokio::test]
async fn test_fatal_close_terminates_client() {
    let mut platform = MockPlatform::start().await.unwrap();
    let client = Client::new(platform.client_config().unwrap()).unwrap();
    client.start().await.unwrap();

    let mut peer = platform.next_peer().await.unwrap();
    peer.hello(QUIET_HEARTBEAT_MS).unwrap();
    peer.expect_op(OpCode::Identify).await.unwrap();
    peer.close(4004).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), client.wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_terminal());
    assert_eq!(client.state(), ClientState::Terminated);
    assert_eq!(client.gateway().unwrap().stats().reconnects, 0);
    assert!(matches!(client.wait_until_ready().await, Err(ClientError::Terminated)));
    platform.expect_no_peer(Duration::from_millis(300)).await.unwrap();
}

#[tokio::test]
async fn test_stop_during_discovery_is_final() {
    let mut platform = MockPlatform::start().await.unwrap();
    let mut config = platform.client_config().unwrap();
    config.gateway.url = None;
    platform.reply_with(
        "GET /gateway/bot",
        MockReply::json(200, gateway_bot(&platform.gateway_url())).delayed(Duration::from_millis(300)),
    );

    let client = Client::new(config).unwrap();
    let starting = tokio::spawn({
        let client = client.clone();
        async move { client.start().await }
    });
    platform.wait_for_call("GET /gateway/bot").await.unwrap();

    tokio::time::timeout(STEP_TIMEOUT, client.stop()).await.unwrap();
    assert!(matches!(starting.await.unwrap(), Err(ClientError::Terminated)));
    assert_eq!(client.state(), ClientState::Terminated);
    assert!(client.wait().await.is_ok());
    platform.expect_no_peer(Duration::from_millis(300)).await.unwrap();
}

#[tokio::test]
async fn test_stop_while_resolving_author_drops_event() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;
    let mut events = client.subscribe();
    platform.reply_with(
        "GET /users/42",
        MockReply::json(200, user(42, "slow")).delayed(Duration::from_millis(300)),
    );

    peer.dispatch("MESSAGE_CREATE", message(500, 100, None, &user(42, "slow"), "pending"))
        .unwrap();
    platform.wait_for_call("GET /users/42").await.unwrap();

    tokio::time::timeout(STEP_TIMEOUT, client.stop()).await.unwrap();
    assert!(tokio::time::timeout(STEP_TIMEOUT, client.wait()).await.unwrap().is_ok());

    assert_eq!(client.router_stats().dropped, 1);
    assert!(client.cache().messages().is_empty());
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, Event::MessageCreate { .. }), "pending event was emitted");
    }
}

// ============================================================================
// Event routing
// ============================================================================

#[tokio::test]
async fn test_ready_and_guild_create_populate_cache() {
    let mut platform = MockPlatform::start().await.unwrap();
    let client = Client::new(platform.client_config().unwrap()).unwrap();
    let mut events = client.subscribe();
    client.start().await.unwrap();

    let mut peer = platform.next_peer().await.unwrap();
    peer.accept_identify(QUIET_HEARTBEAT_MS, ready("s", &[10])).await.unwrap();
    let event = next_event(&mut events, |e| matches!(e, Event::Ready { .. })).await.unwrap();
    let Event::Ready { guilds, .. } = event else { unreachable!() };
    assert_eq!(guilds, vec![Snowflake::new(10)]);
    assert!(client.cache().get::<Guild>(Snowflake::new(10)).unwrap().read().unavailable);

    peer.dispatch("GUILD_CREATE", guild(10, "home", &[text_channel(100, 10, "general")]))
        .unwrap();
    next_event(&mut events, |e| matches!(e, Event::GuildCreate(_))).await.unwrap();

    let guild = client.cache().get::<Guild>(Snowflake::new(10)).unwrap();
    assert_eq!(guild.read().name, "home");
    assert!(!guild.read().unavailable);
    let channel = client.cache().get::<Channel>(Snowflake::new(100)).unwrap();
    assert_eq!(channel.read().guild_id, Some(Snowflake::new(10)));
    client.stop().await;
}

#[tokio::test]
async fn test_unknown_author_resolved_before_emit() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;
    let mut events = client.subscribe();
    platform.reply("GET /users/42", 200, user(42, "resolved"));

    peer.dispatch("MESSAGE_CREATE", message(500, 100, Some(10), &user(42, "embedded"), "hi"))
        .unwrap();
    let event = next_event(&mut events, |e| matches!(e, Event::MessageCreate { .. }))
        .await
        .unwrap();
    let Event::MessageCreate { message, author } = event else { unreachable!() };

    assert_eq!(platform.calls_to("GET /users/42").len(), 1);
    assert_eq!(author.read().id, Snowflake::new(42));
    assert_eq!(message.read().author_id, Snowflake::new(42));
    assert!(author.ptr_eq(&client.cache().author_of(&message.read()).unwrap()));

    // Known now: the next message merges the embedded copy without REST
    peer.dispatch("MESSAGE_CREATE", integration_tests::fixtures::message(501, 100, Some(10), &user(42, "renamed"), "again"))
        .unwrap();
    next_event(&mut events, |e| matches!(e, Event::MessageCreate { .. })).await.unwrap();
    assert_eq!(platform.calls_to("GET /users/42").len(), 1);
    assert_eq!(author.read().username, "renamed");
    client.stop().await;
}

#[tokio::test]
async fn test_unresolvable_author_drops_only_that_event() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;
    let mut events = client.subscribe();

    peer.dispatch("MESSAGE_CREATE", message(500, 100, None, &user(404, "ghost"), "lost"))
        .unwrap();
    peer.dispatch("MESSAGE_CREATE", message(501, 100, None, &self_user(), "kept"))
        .unwrap();

    let event = next_event(&mut events, |e| matches!(e, Event::MessageCreate { .. }))
        .await
        .unwrap();
    let Event::MessageCreate { message, .. } = event else { unreachable!() };
    assert_eq!(message.read().content, "kept");
    assert_eq!(client.router_stats().dropped, 1);
    assert!(client.cache().get::<User>(Snowflake::new(404)).is_none());
    client.stop().await;
}

#[tokio::test]
async fn test_events_keep_gateway_order() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;
    let mut events = client.subscribe();
    platform.reply("GET /users/7", 200, user(7, "slow"));

    // The first needs a REST round trip, the second does not
    peer.dispatch("MESSAGE_CREATE", message(1, 100, None, &user(7, "slow"), "first"))
        .unwrap();
    peer.dispatch("MESSAGE_CREATE", message(2, 100, None, &self_user(), "second"))
        .unwrap();

    let mut order = Vec::new();
    for _ in 0..2 {
        let event = next_event(&mut events, |e| matches!(e, Event::MessageCreate { .. }))
            .await
            .unwrap();
        if let Event::MessageCreate { message, .. } = event {
            order.push(message.read().content.clone());
        }
    }
    assert_eq!(order, vec!["first", "second"]);
    client.stop().await;
}

#[tokio::test]
async fn test_resume_keeps_cache() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut first) = connected(&mut platform).await;
    let mut events = client.subscribe();
    first.dispatch("GUILD_CREATE", guild(10, "home", &[])).unwrap();
    next_event(&mut events, |e| matches!(e, Event::GuildCreate(_))).await.unwrap();
    let held = client.cache().get::<Guild>(Snowflake::new(10)).unwrap();

    first.hang_up();
    let mut second = platform.next_peer().await.unwrap();
    second.hello(QUIET_HEARTBEAT_MS).unwrap();
    second.expect_op(OpCode::Resume).await.unwrap();
    second.resume_sequence_at(2);
    second.dispatch("RESUMED", json!({})).unwrap();
    next_event(&mut events, |e| matches!(e, Event::Resumed)).await.unwrap();

    let gateway = client.gateway().unwrap();
    wait_for_status(&gateway, ConnectionStatus::Ready).await.unwrap();
    assert!(held.ptr_eq(&client.cache().get::<Guild>(Snowflake::new(10)).unwrap()));
    assert_eq!(gateway.stats().resumes, 1);
    client.stop().await;
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn test_reply_posts_reference_and_caches_result() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, mut peer) = connected(&mut platform).await;
    let mut events = client.subscribe();

    peer.dispatch("MESSAGE_CREATE", message(500, 100, Some(10), &self_user(), "ping"))
        .unwrap();
    let event = next_event(&mut events, |e| matches!(e, Event::MessageCreate { .. }))
        .await
        .unwrap();
    let Event::MessageCreate { message: original, .. } = event else { unreachable!() };

    platform.reply(
        "POST /channels/100/messages",
        200,
        message(501, 100, Some(10), &self_user(), "pong"),
    );
    let reply = client
        .reply(&original.snapshot(), &json!({ "content": "pong" }))
        .await
        .unwrap();

    let calls = platform.calls_to("POST /channels/100/messages");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body["content"], "pong");
    assert_eq!(calls[0].body["message_reference"]["message_id"], "500");
    assert_eq!(reply.read().content, "pong");
    assert!(client.cache().messages().contains(Snowflake::new(501)));
    client.stop().await;
}

#[tokio::test]
async fn test_fetch_member_uses_cache_after_first_call() {
    let mut platform = MockPlatform::start().await.unwrap();
    let (client, _peer) = connected(&mut platform).await;
    platform.reply(
        "GET /guilds/10/members/42",
        200,
        json!({ "user": user(42, "m"), "nick": "nick", "roles": ["1"] }),
    );

    let member = client
        .fetch_member(Snowflake::new(10), Snowflake::new(42))
        .await
        .unwrap();
    assert_eq!(member.read().nick.as_deref(), Some("nick"));
    client
        .fetch_member(Snowflake::new(10), Snowflake::new(42))
        .await
        .unwrap();
    assert_eq!(platform.calls_to("GET /guilds/10/members/42").len(), 1);
    client.stop().await;
}
