//! Request dispatcher
//!
//! Each route signature gets its own FIFO queue drained by one worker task, so
//! requests on the same route run in submission order while independent routes
//! proceed concurrently. Workers acquire the rate limiter before every attempt
//! and feed each response's headers back into it. A worker that stays idle
//! for [`QUEUE_IDLE_TIMEOUT`] releases its queue and the limiter forgets
//! buckets that no longer restrict anything.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chat_common::{ApiError, ApiErrorBody, Backoff, BotToken, RestConfig};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::RestError;
use crate::ratelimit::{MajorParameters, RateLimitHeaders, RateLimiter, RouteSignature};
use crate::routes::{GatewayBot, Request, RestResponse, Route};
use crate::transport::{HttpTransport, ReqwestTransport};

/// How long a route queue may sit empty before its worker exits
pub const QUEUE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry budget for failures that are not scheduled rate-limit waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// A request waiting in its route's queue
#[derive(Debug)]
pub struct QueuedRequest {
    pub request: Request,
    pub signature: RouteSignature,
    completion: oneshot::Sender<Result<RestResponse, RestError>>,
}

impl QueuedRequest {
    fn complete(self, result: Result<RestResponse, RestError>) {
        // The caller may have stopped waiting
        let _ = self.completion.send(result);
    }
}

/// Resolves once the dispatcher has a final result for the request
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<RestResponse, RestError>>,
}

impl Future for ResponseFuture {
    type Output = Result<RestResponse, RestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(RestError::Cancelled)))
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestStats {
    /// Attempts sent to the transport
    pub requests: u64,
    /// Attempts that consumed the retry budget
    pub retries: u64,
    /// 429 responses received
    pub rate_limited: u64,
    /// Routes with a live queue
    pub queues: usize,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    params: MajorParameters,
    policy: RetryPolicy,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<QueuedRequest>>>,
    shutdown: watch::Sender<bool>,
    counters: Arc<Counters>,
}

/// Rate-limited REST client. Cheap to clone.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("queues", &self.inner.queues.len())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &RestConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                transport,
                limiter: Arc::new(RateLimiter::new(config.global_per_second)),
                params: MajorParameters::from_config(config),
                policy: RetryPolicy::from_config(config),
                queues: Arc::new(DashMap::new()),
                shutdown,
                counters: Arc::new(Counters::default()),
            }),
        }
    }

    /// Client backed by `reqwest`
    pub fn from_config(config: &RestConfig, token: &BotToken) -> Result<Self, RestError> {
        let transport = ReqwestTransport::new(config, token)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Override the retry policy. Only affects routes without a queue yet.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.policy = policy;
        }
        self
    }

    /// Enqueue a request on its route's queue.
    ///
    /// Must be called from within a Tokio runtime. The returned future
    /// resolves with the final response, an error, or [`RestError::Cancelled`]
    /// once the client is shut down.
    pub fn dispatch(&self, request: Request) -> ResponseFuture {
        let (tx, rx) = oneshot::channel();
        let signature = self.inner.params.signature(request.method, &request.path);
        let queued = QueuedRequest {
            request,
            signature,
            completion: tx,
        };

        if self.is_shutdown() {
            queued.complete(Err(RestError::Cancelled));
            return ResponseFuture { rx };
        }

        let sender = self.queue(&queued.signature.key);
        if let Err(mpsc::error::SendError(queued)) = sender.send(queued) {
            queued.complete(Err(RestError::Cancelled));
        }
        ResponseFuture { rx }
    }

    /// Dispatch and decode a successful response
    pub async fn request<T: DeserializeOwned>(&self, request: impl Into<Request>) -> Result<T, RestError> {
        self.dispatch(request.into()).await?.json()
    }

    /// Dispatch and discard the body
    pub async fn execute(&self, request: impl Into<Request>) -> Result<(), RestError> {
        self.dispatch(request.into()).await.map(drop)
    }

    /// Discover the gateway URL
    pub async fn gateway_bot(&self) -> Result<GatewayBot, RestError> {
        self.request(Route::GetGatewayBot).await
    }

    /// Cancel queued requests and reject new ones.
    ///
    /// Requests already on the wire finish, but their callers receive
    /// [`RestError::Cancelled`].
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            tracing::info!(queues = self.inner.queues.len(), "REST dispatcher shutting down");
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    #[must_use]
    pub fn stats(&self) -> RestStats {
        let counters = &self.inner.counters;
        RestStats {
            requests: counters.requests.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            queues: self.inner.queues.len(),
        }
    }

    fn queue(&self, key: &str) -> mpsc::UnboundedSender<QueuedRequest> {
        if let Some(sender) = self.inner.queues.get(key) {
            return sender.clone();
        }
        self.inner
            .queues
            .entry(key.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = Worker {
                    route: key.to_string(),
                    transport: self.inner.transport.clone(),
                    limiter: self.inner.limiter.clone(),
                    policy: self.inner.policy,
                    shutdown: self.inner.shutdown.subscribe(),
                    counters: self.inner.counters.clone(),
                    queues: self.inner.queues.clone(),
                    own: tx.downgrade(),
                };
                tokio::spawn(worker.run(rx));
                tracing::debug!(route = key, "Route queue created");
                tx
            })
            .value()
            .clone()
    }
}

/// Outcome of one attempt
enum Attempt {
    Done(RestResponse),
    /// Scheduled rate-limit wait, retried without consuming the budget
    Wait,
    Failed(RestError),
}

struct Worker {
    route: String,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<QueuedRequest>>>,
    /// Identifies this worker's entry in `queues`
    own: mpsc::WeakUnboundedSender<QueuedRequest>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
        let mut retired = false;
        loop {
            let queued = tokio::select! {
                biased;
                () = shutdown_signal(&mut self.shutdown) => break,
                next = rx.recv() => match next {
                    Some(queued) => queued,
                    // Released, and every sender that raced the release is done
                    None => return,
                },
                () = tokio::time::sleep(QUEUE_IDLE_TIMEOUT), if !retired => {
                    self.retire();
                    retired = true;
                    continue;
                }
            };

            let result = self.execute(&queued.request, &queued.signature).await;
            let result = if *self.shutdown.borrow() {
                Err(RestError::Cancelled)
            } else {
                result
            };
            queued.complete(result);
        }

        rx.close();
        let mut cancelled = 0usize;
        while let Ok(queued) = rx.try_recv() {
            queued.complete(Err(RestError::Cancelled));
            cancelled += 1;
        }
        tracing::debug!(route = %self.route, cancelled, "Route queue stopped");
    }

    /// Drop this worker's queue entry so the next request on the route starts
    /// a fresh one. Requests already holding a sender still drain here.
    fn retire(&self) {
        let released = self
            .queues
            .remove_if(&self.route, |_, sender| {
                self.own.upgrade().is_some_and(|own| own.same_channel(sender))
            })
            .is_some();
        let pruned = self.limiter.prune();
        tracing::debug!(route = %self.route, released, pruned, "Idle route queue released");
    }

    async fn execute(&mut self, request: &Request, signature: &RouteSignature) -> Result<RestResponse, RestError> {
        let mut backoff = Backoff::new(self.policy.backoff_base, self.policy.backoff_max);
        let mut retries = 0u32;

        loop {
            if until_shutdown(&mut self.shutdown, self.limiter.acquire(signature))
                .await
                .is_none()
            {
                return Err(RestError::Cancelled);
            }

            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            let error = match self.transport.send(request).await {
                Ok(response) => match self.classify(signature, response) {
                    Attempt::Done(response) => return Ok(response),
                    Attempt::Wait => continue,
                    Attempt::Failed(error) => error,
                },
                Err(error) => RestError::Transport(error),
            };

            if !error.is_retryable() {
                return Err(error);
            }
            if retries >= self.policy.max_retries {
                tracing::warn!(route = %self.route, attempts = retries + 1, error = %error, "Retries exhausted");
                return Err(RestError::RetriesExhausted {
                    attempts: retries + 1,
                    last: Box::new(error),
                });
            }

            retries += 1;
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            let delay = backoff.next_delay();
            tracing::warn!(
                route = %self.route,
                attempt = retries,
                delay_ms = delay.as_millis(),
                error = %error,
                "Retrying request"
            );
            if until_shutdown(&mut self.shutdown, tokio::time::sleep(delay))
                .await
                .is_none()
            {
                return Err(RestError::Cancelled);
            }
        }
    }

    fn classify(&self, signature: &RouteSignature, response: RestResponse) -> Attempt {
        let headers = RateLimitHeaders::parse(&response.headers);
        self.limiter.update(signature, &headers);

        if response.status == 429 {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            let headers = headers.with_body(&response.body);
            if headers.retry_after.is_some() {
                self.limiter.rate_limited(signature, &headers);
                return Attempt::Wait;
            }
            return Attempt::Failed(RestError::RateLimited {
                route: signature.key.clone(),
            });
        }

        if response.is_success() {
            return Attempt::Done(response);
        }

        let error = ApiError::new(response.status, ApiErrorBody::from_bytes(&response.body));
        tracing::debug!(route = %self.route, status = error.status, code = error.body.code, "Request failed");
        Attempt::Failed(error.into())
    }
}

/// Resolves once shutdown is requested or the client is gone
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn until_shutdown<F: Future>(shutdown: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = shutdown_signal(shutdown) => None,
        output = fut => Some(output),
    }
}
