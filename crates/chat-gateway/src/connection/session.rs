//! Session state
//!
//! Holds what a resume needs: the session id, the last sequence received, and
//! the URL to resume on. Only the connection's read loop writes to it.

use std::fmt;
use std::time::Duration;

use crate::protocol::ReadyPayload;

/// Connection lifecycle as seen by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Not connected; a reconnect may follow
    Disconnected,
    /// Opening the transport and waiting for Hello
    Connecting,
    /// Identify sent, waiting for `READY`
    Identifying,
    /// Resume sent, waiting for `RESUMED`
    Resuming,
    /// Session established
    Ready,
    /// Closed for good
    Terminated,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Terminated => "terminated",
        }
    }

    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resumable session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
    heartbeat_interval: Option<Duration>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last sequence received
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Record a dispatch sequence number. The stored value never decreases.
    ///
    /// Returns `false` if `sequence` was behind the stored value.
    pub fn record_sequence(&mut self, sequence: u64) -> bool {
        match self.sequence {
            Some(current) if sequence < current => {
                tracing::warn!(current, received = sequence, "Out-of-order sequence ignored");
                false
            }
            _ => {
                self.sequence = Some(sequence);
                true
            }
        }
    }

    pub(crate) fn set_heartbeat_interval(&mut self, interval: Duration) {
        self.heartbeat_interval = Some(interval);
    }

    /// Adopt a fresh session from `READY`
    pub fn establish(&mut self, ready: &ReadyPayload) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_url = ready.resume_gateway_url.clone();
    }

    /// A resume is possible once a session id is known
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Forget the session so the next connection identifies
    pub fn clear(&mut self) {
        self.session_id = None;
        self.sequence = None;
        self.resume_url = None;
    }
}
