//! REST dispatcher tests over real HTTP
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use std::time::Duration;

use chat_common::{BotToken, RestConfig};
use chat_rest::{RestClient, RestError, Route};
use chat_core::Snowflake;
use integration_tests::{fixtures::*, MockPlatform, MockReply, TEST_TOKEN};
use serde_json::{json, Value};
use tokio::time::Instant;

fn rest_client(platform: &MockPlatform) -> RestClient {
    let config = RestConfig {
        api_base_url: platform.api_url(),
        max_retries: 1,
        ..RestConfig::default()
    };
    RestClient::from_config(&config, &BotToken::new(TEST_TOKEN).unwrap()).unwrap()
}

fn get_message(channel_id: u64) -> Route {
    Route::GetMessage {
        channel_id: Snowflake::new(channel_id),
        message_id: Snowflake::new(1),
    }
}

#[tokio::test]
async fn test_rate_limit_is_isolated_to_its_bucket() {
    let platform = MockPlatform::start().await.unwrap();
    let rest = rest_client(&platform);
    let body = message(1, 100, None, &self_user(), "x");

    platform.reply_with("GET /channels/100/messages/1", rate_limited("limited", 0.5));
    platform.reply("GET /channels/100/messages/1", 200, body.clone());
    platform.reply("GET /channels/200/messages/1", 200, body);

    let started = Instant::now();
    let limited = tokio::spawn({
        let rest = rest.clone();
        async move { rest.request::<Value>(get_message(100)).await }
    });
    // Let the 429 land before the other channel is asked
    tokio::time::sleep(Duration::from_millis(100)).await;
    rest.request::<Value>(get_message(200)).await.unwrap();
    let free_elapsed = started.elapsed();

    limited.await.unwrap().unwrap();
    let limited_calls = platform.calls_to("GET /channels/100/messages/1");

    assert!(free_elapsed < Duration::from_millis(450), "other bucket waited {free_elapsed:?}");
    assert_eq!(limited_calls.len(), 2);
    assert!(limited_calls[1].at - limited_calls[0].at >= Duration::from_millis(450));
    assert_eq!(rest.stats().rate_limited, 1);
    assert_eq!(rest.stats().retries, 0);
}

#[tokio::test]
async fn test_bucket_exhaustion_delays_next_request() {
    let platform = MockPlatform::start().await.unwrap();
    let rest = rest_client(&platform);
    let route = "GET /users/5";
    platform.reply_with(
        route,
        with_bucket(MockReply::json(200, user(5, "a")), "users", 0, 0.3),
    );
    platform.reply(route, 200, user(5, "a"));

    let user_route = || Route::GetUser { user_id: Snowflake::new(5) };
    rest.request::<Value>(user_route()).await.unwrap();
    rest.request::<Value>(user_route()).await.unwrap();

    let calls = platform.calls_to(route);
    assert_eq!(calls.len(), 2);
    assert!(calls[1].at - calls[0].at >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_server_error_retried_once() {
    let platform = MockPlatform::start().await.unwrap();
    let rest = rest_client(&platform);
    platform.reply("GET /users/5", 502, json!({ "message": "bad gateway", "code": 0 }));
    platform.reply("GET /users/5", 200, user(5, "back"));

    let user: Value = rest
        .request(Route::GetUser { user_id: Snowflake::new(5) })
        .await
        .unwrap();
    assert_eq!(user["username"], "back");
    assert_eq!(rest.stats().retries, 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let platform = MockPlatform::start().await.unwrap();
    let rest = rest_client(&platform);
    platform.reply(
        "GET /channels/9",
        403,
        json!({ "message": "Missing Access", "code": 50001 }),
    );

    let err = rest
        .request::<Value>(Route::GetChannel { channel_id: Snowflake::new(9) })
        .await
        .unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.status, 403);
    assert_eq!(api.body.code, 50001);
    assert_eq!(platform.calls(), vec!["GET /channels/9"]);
}

#[tokio::test]
async fn test_shutdown_cancels_requests() {
    let platform = MockPlatform::start().await.unwrap();
    let rest = rest_client(&platform);
    rest.shutdown();

    let err = rest.execute(get_message(100)).await.unwrap_err();
    assert!(matches!(err, RestError::Cancelled));
    assert!(platform.calls().is_empty());
}
