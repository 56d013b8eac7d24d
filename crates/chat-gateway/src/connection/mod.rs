//! Connection management
//!
//! Session state, heartbeating, and the reconnecting connection runner.

mod heartbeat;
mod runner;
mod session;

pub use runner::{Dispatch, GatewayConnection, GatewayHandle, GatewayOptions, GatewayStats};
pub use session::{ConnectionStatus, Session};
