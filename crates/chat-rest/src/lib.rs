//! # chat-rest
//!
//! Outbound REST dispatcher with per-route and global rate-limit accounting.
//!
//! ## Features
//!
//! - **Routes**: typed catalog of the endpoints the client uses, plus raw requests
//! - **Bucket keys**: route signatures keep major parameters and collapse the rest,
//!   driven by a configurable table
//! - **Rate limiter**: server headers are authoritative; a global bucket gates every route
//! - **Queues**: one FIFO worker per route signature, independent routes run concurrently
//! - **Retries**: scheduled 429 waits are free, 5xx and transport failures consume a bounded budget
//!
//! ## Example
//!
//! ```ignore
//! use chat_rest::{RestClient, Route};
//!
//! let rest = RestClient::from_config(&config.rest, &config.token)?;
//! let user: serde_json::Value = rest.request(Route::GetUser { user_id }).await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod ratelimit;
pub mod routes;
pub mod transport;

pub use dispatcher::{QueuedRequest, ResponseFuture, RestClient, RestStats, RetryPolicy};
pub use error::{RestError, TransportError};
pub use ratelimit::{
    BucketSnapshot, MajorParameters, RateLimitHeaders, RateLimitScope, RateLimiter,
    RouteSignature,
};
pub use routes::{GatewayBot, Method, Request, RestResponse, Route, SessionStartLimit};
pub use transport::{HttpTransport, ReqwestTransport};
