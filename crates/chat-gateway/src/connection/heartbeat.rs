//! Heartbeat task
//!
//! Runs alongside the read loop for one connection. The first beat is
//! jittered; later beats follow the Hello interval. A beat that is due while
//! the previous one is still unacknowledged marks the connection as a zombie.
//! The zombie signal fires at most once, then the task exits. A closed writer
//! also ends the task, without the signal; the read loop notices that itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::runner::{Counters, Outbound};
use super::session::Session;
use crate::protocol::GatewayMessage;

/// Result of one beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Beat {
    Sent,
    /// The previous beat was never acknowledged
    Missed,
    /// The writer task is gone
    WriterClosed,
}

pub(crate) struct Heartbeat {
    pub interval: Duration,
    pub session: Arc<Mutex<Session>>,
    /// Cleared when a beat is sent, set by the read loop on op 11
    pub acked: Arc<AtomicBool>,
    pub outbound: mpsc::Sender<Outbound>,
    pub zombie: oneshot::Sender<()>,
    pub counters: Arc<Counters>,
}

impl Heartbeat {
    pub(crate) async fn run(self) {
        let jitter: f64 = rand::random();
        let first = self.interval.mul_f64(jitter);
        tracing::debug!(
            interval_ms = self.interval.as_millis(),
            first_ms = first.as_millis(),
            "Heartbeat started"
        );

        tokio::time::sleep(first).await;
        loop {
            match self.beat().await {
                Beat::Sent => {}
                Beat::Missed => {
                    tracing::warn!("Heartbeat not acknowledged, connection is a zombie");
                    self.counters.zombies.fetch_add(1, Ordering::Relaxed);
                    let _ = self.zombie.send(());
                    return;
                }
                Beat::WriterClosed => {
                    tracing::debug!("Writer closed, heartbeat stopped");
                    return;
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Send one beat if the previous one was acknowledged
    async fn beat(&self) -> Beat {
        if !self.acked.swap(false, Ordering::AcqRel) {
            return Beat::Missed;
        }
        let sequence = self.session.lock().sequence();
        tracing::trace!(seq = ?sequence, "Sending heartbeat");
        match self
            .outbound
            .send(Outbound::Frame(GatewayMessage::heartbeat(sequence)))
            .await
        {
            Ok(()) => {
                self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
                Beat::Sent
            }
            Err(_) => Beat::WriterClosed,
        }
    }
}
