//! Canned REST backend for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_common::RestConfig;
use chat_rest::{HttpTransport, Request, RestClient, RestResponse, RetryPolicy, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Replies per `"METHOD /path"`; anything unscripted is a 404
#[derive(Default)]
pub(crate) struct StubTransport {
    replies: Mutex<HashMap<String, VecDeque<(u16, Value)>>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
}

impl StubTransport {
    pub(crate) fn reply(&self, route: &str, status: u16, body: Value) {
        self.replies
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back((status, body));
    }

    /// Hold every reply for `latency`
    pub(crate) fn delay(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: &Request) -> Result<RestResponse, TransportError> {
        let route = format!("{} {}", request.method, request.path);
        self.calls.lock().push(route.clone());
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let (status, body) = self
            .replies
            .lock()
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| (404, json!({ "code": 10013, "message": "Unknown" })));
        Ok(RestResponse {
            status,
            headers: Default::default(),
            body: if body.is_null() { Vec::new() } else { body.to_string().into_bytes() },
        })
    }
}

/// REST client over a stub, with no retries
pub(crate) fn rest(stub: &Arc<StubTransport>) -> RestClient {
    RestClient::new(stub.clone(), &RestConfig::default()).with_retry_policy(RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::from_config(&RestConfig::default())
    })
}
