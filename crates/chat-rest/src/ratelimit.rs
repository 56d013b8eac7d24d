//! Rate-limit accounting
//!
//! Requests are grouped by a route signature: method plus path with minor ids
//! collapsed. The server reports a bucket hash for each route. Routes that
//! report the same hash under the same major parameter share one bucket.
//! A global bucket gates every route.
//!
//! Server headers are authoritative. Every response overwrites local counts.

use std::sync::Arc;
use std::time::Duration;

use chat_common::RestConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::time::Instant;

use crate::routes::Method;

const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

// =============================================================================
// Route signatures
// =============================================================================

/// Bucket identity of a request before the server names its bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteSignature {
    /// `METHOD /path` with minor parameters collapsed
    pub key: String,
    /// First major parameter, e.g. `channels/123`. Empty for top-level routes.
    pub major: String,
}

/// Table of resources whose ids stay in the bucket key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MajorParameters {
    major: Vec<String>,
    opaque: Vec<String>,
}

impl Default for MajorParameters {
    fn default() -> Self {
        Self::from_config(&RestConfig::default())
    }
}

impl MajorParameters {
    pub fn new<M, O>(major: M, opaque: O) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            major: major.into_iter().map(Into::into).collect(),
            opaque: opaque.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RestConfig) -> Self {
        Self::new(
            config.major_parameters.iter().cloned(),
            config.opaque_parameters.iter().cloned(),
        )
    }

    /// Compute the signature of `method path`.
    ///
    /// The id after a major resource is kept. The segment after an opaque
    /// resource becomes `:opaque`. Any other numeric segment becomes `:id`.
    /// The query string is ignored.
    #[must_use]
    pub fn signature(&self, method: Method, path: &str) -> RouteSignature {
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = Vec::new();
        let mut major = String::new();
        let mut previous: Option<&str> = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let collapsed = match previous {
                Some(resource) if self.is_major(resource) && is_id(segment) => {
                    if major.is_empty() {
                        major = format!("{resource}/{segment}");
                    }
                    segment
                }
                Some(resource) if self.is_opaque(resource) => ":opaque",
                _ if is_id(segment) => ":id",
                _ => segment,
            };
            segments.push(collapsed);
            previous = Some(segment);
        }

        RouteSignature {
            key: format!("{method} /{}", segments.join("/")),
            major,
        }
    }

    fn is_major(&self, resource: &str) -> bool {
        self.major.iter().any(|m| m == resource)
    }

    fn is_opaque(&self, resource: &str) -> bool {
        self.opaque.iter().any(|o| o == resource)
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// Headers
// =============================================================================

/// Which limit a 429 refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitScope {
    /// Per-route limit of this bot
    #[default]
    User,
    /// Account-wide limit
    Global,
    /// Limit on the resource shared with other users
    Shared,
}

impl RateLimitScope {
    fn parse(raw: &str) -> Self {
        match raw {
            "global" => Self::Global,
            "shared" => Self::Shared,
            _ => Self::User,
        }
    }
}

/// Rate-limit information reported with a response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub global: bool,
    pub scope: Option<RateLimitScope>,
    pub retry_after: Option<Duration>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

impl RateLimitHeaders {
    /// Read the `x-ratelimit-*` and `retry-after` headers
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        let seconds = |name: &str| text(name).and_then(|v| v.parse::<f64>().ok()).and_then(secs);

        Self {
            limit: text("x-ratelimit-limit").and_then(|v| v.parse().ok()),
            remaining: text("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
            reset_after: seconds("x-ratelimit-reset-after"),
            bucket: text("x-ratelimit-bucket").map(String::from),
            global: text("x-ratelimit-global").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            scope: text("x-ratelimit-scope").map(RateLimitScope::parse),
            retry_after: seconds("retry-after"),
        }
    }

    /// Fill in what a 429 body reports when the headers were silent
    #[must_use]
    pub fn with_body(mut self, body: &[u8]) -> Self {
        if let Ok(parsed) = serde_json::from_slice::<RateLimitBody>(body) {
            if self.retry_after.is_none() {
                self.retry_after = parsed.retry_after.and_then(secs);
            }
            self.global |= parsed.global;
        }
        self
    }

    /// Whether a 429 applies to every route
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.global || self.scope == Some(RateLimitScope::Global)
    }
}

fn secs(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

// =============================================================================
// Buckets
// =============================================================================

#[derive(Debug, Default)]
struct BucketState {
    limit: Option<u32>,
    /// `None` until the server reports a count
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    hash: Option<String>,
}

#[derive(Debug, Default)]
struct Bucket {
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Take one slot, or report how long until the bucket refills
    fn try_take(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();
        if state.reset_at.is_some_and(|reset| now >= reset) {
            state.remaining = state.limit;
            state.reset_at = None;
        }
        match (state.remaining, state.reset_at) {
            (Some(0), Some(reset)) => Err(reset - now),
            (Some(n), _) => {
                state.remaining = Some(n.saturating_sub(1));
                Ok(())
            }
            (None, _) => Ok(()),
        }
    }

    /// Like `try_take` without consuming a slot
    fn peek(&self, now: Instant) -> Result<(), Duration> {
        let state = self.state.lock();
        match (state.remaining, state.reset_at) {
            (Some(0), Some(reset)) if now < reset => Err(reset - now),
            _ => Ok(()),
        }
    }

    fn apply(&self, headers: &RateLimitHeaders, now: Instant) {
        let mut state = self.state.lock();
        if let Some(limit) = headers.limit {
            state.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            state.remaining = Some(remaining);
        }
        if let Some(reset_after) = headers.reset_after {
            state.reset_at = Some(now + reset_after);
        }
        if let Some(hash) = &headers.bucket {
            state.hash = Some(hash.clone());
        }
    }

    /// Block until `until`, never shortening an existing block
    fn block(&self, until: Instant) {
        let mut state = self.state.lock();
        state.remaining = Some(0);
        state.reset_at = Some(state.reset_at.map_or(until, |reset| reset.max(until)));
    }

    /// No limit is pending: never reported, or the reset has passed
    fn is_idle(&self, now: Instant) -> bool {
        self.state.lock().reset_at.is_none_or(|reset| now >= reset)
    }

    fn snapshot(&self, now: Instant) -> BucketSnapshot {
        let state = self.state.lock();
        BucketSnapshot {
            limit: state.limit,
            remaining: state.remaining,
            reset_after: state.reset_at.map(|reset| reset.saturating_duration_since(now)),
            hash: state.hash.clone(),
        }
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub hash: Option<String>,
}

#[derive(Debug)]
struct GlobalState {
    blocked_until: Option<Instant>,
    window_start: Instant,
    used: u32,
}

impl GlobalState {
    fn try_take(&mut self, now: Instant, per_second: u32) -> Result<(), Duration> {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(until - now);
            }
            self.blocked_until = None;
        }
        if per_second == 0 {
            return Ok(());
        }
        if now >= self.window_start + GLOBAL_WINDOW {
            self.window_start = now;
            self.used = 0;
        }
        if self.used >= per_second {
            return Err(self.window_start + GLOBAL_WINDOW - now);
        }
        self.used += 1;
        Ok(())
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Shared bucket table plus the global bucket
#[derive(Debug)]
pub struct RateLimiter {
    /// Route signature key -> bucket
    routes: DashMap<String, Arc<Bucket>>,
    /// `{hash}:{major}` -> bucket shared by every route reporting that hash
    hashes: DashMap<String, Arc<Bucket>>,
    global: Mutex<GlobalState>,
    global_per_second: u32,
}

impl RateLimiter {
    /// `global_per_second` of 0 disables the local global window
    #[must_use]
    pub fn new(global_per_second: u32) -> Self {
        Self {
            routes: DashMap::new(),
            hashes: DashMap::new(),
            global: Mutex::new(GlobalState {
                blocked_until: None,
                window_start: Instant::now(),
                used: 0,
            }),
            global_per_second,
        }
    }

    fn bucket(&self, signature: &RouteSignature) -> Arc<Bucket> {
        self.routes
            .entry(signature.key.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Wait until both the route's bucket and the global bucket have capacity,
    /// then take a slot from each.
    ///
    /// Unknown buckets are assumed to have capacity. No lock is held while
    /// waiting.
    pub async fn acquire(&self, signature: &RouteSignature) {
        loop {
            let now = Instant::now();
            let bucket = self.bucket(signature);

            if let Err(wait) = bucket.peek(now) {
                tracing::debug!(route = %signature.key, wait_ms = wait.as_millis(), "Bucket exhausted, waiting");
                tokio::time::sleep(wait).await;
                continue;
            }

            let global = self.global.lock().try_take(now, self.global_per_second);
            if let Err(wait) = global {
                tracing::debug!(route = %signature.key, wait_ms = wait.as_millis(), "Global limit reached, waiting");
                tokio::time::sleep(wait).await;
                continue;
            }

            match bucket.try_take(now) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Record the limits reported with a response of any status
    pub fn update(&self, signature: &RouteSignature, headers: &RateLimitHeaders) {
        let now = Instant::now();
        let bucket = match &headers.bucket {
            Some(hash) => self.alias(signature, hash),
            None => self.bucket(signature),
        };
        bucket.apply(headers, now);
    }

    /// Apply a 429. Global limits block every route, others block the bucket.
    pub fn rate_limited(&self, signature: &RouteSignature, headers: &RateLimitHeaders) {
        let Some(retry_after) = headers.retry_after else {
            return;
        };
        let until = Instant::now() + retry_after;

        if headers.is_global() {
            let mut global = self.global.lock();
            global.blocked_until = Some(global.blocked_until.map_or(until, |b| b.max(until)));
            tracing::warn!(
                route = %signature.key,
                retry_after_ms = retry_after.as_millis(),
                "Global rate limit hit"
            );
        } else {
            self.bucket(signature).block(until);
            tracing::warn!(
                route = %signature.key,
                retry_after_ms = retry_after.as_millis(),
                scope = ?headers.scope,
                "Route rate limit hit"
            );
        }
    }

    /// Point the route at the bucket shared under `hash`, adopting the route's
    /// current bucket when the hash is new
    fn alias(&self, signature: &RouteSignature, hash: &str) -> Arc<Bucket> {
        let current = self.bucket(signature);
        let shared = self
            .hashes
            .entry(format!("{hash}:{}", signature.major))
            .or_insert_with(|| current.clone())
            .value()
            .clone();

        if !Arc::ptr_eq(&current, &shared) {
            tracing::debug!(route = %signature.key, bucket = hash, "Route joined shared bucket");
            self.routes.insert(signature.key.clone(), shared.clone());
        }
        shared
    }

    /// Current state of the route's bucket, if it has been seen
    #[must_use]
    pub fn snapshot(&self, signature: &RouteSignature) -> Option<BucketSnapshot> {
        let now = Instant::now();
        self.routes
            .get(&signature.key)
            .map(|bucket| bucket.snapshot(now))
    }

    /// Remaining time of a global block
    #[must_use]
    pub fn global_blocked_for(&self) -> Option<Duration> {
        let now = Instant::now();
        self.global
            .lock()
            .blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Forget buckets that restrict nothing. Returns the number of routes dropped.
    ///
    /// A pruned route starts over with an unknown bucket, which is what an
    /// elapsed reset would give it anyway.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.routes.len();
        self.routes.retain(|_, bucket| !bucket.is_idle(now));
        self.hashes.retain(|_, bucket| !bucket.is_idle(now));
        before.saturating_sub(self.routes.len())
    }

    /// Number of distinct buckets known
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.routes.len()
    }
}
