//! Ping/pong bookkeeping for one open socket.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Heartbeat state, reset on every `Open`.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatState {
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_pong_at: Option<DateTime<Utc>>,
    outstanding: bool,
    missed: u32,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Called on each interval tick before sending a ping.
    ///
    /// Returns the consecutive missed-pong count after accounting for the
    /// previous ping.
    pub fn on_tick(&mut self) -> u32 {
        if self.outstanding {
            self.missed += 1;
        }
        self.missed
    }

    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
        self.outstanding = true;
    }

    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
        self.last_pong_at = Some(Utc::now());
        self.outstanding = false;
        self.missed = 0;
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Time between the last ping and the pong that answered it.
    pub fn round_trip(&self) -> Option<Duration> {
        match (self.last_ping, self.last_pong) {
            (Some(ping), Some(pong)) if pong >= ping => Some(pong - ping),
            _ => None,
        }
    }

    /// Wall-clock time of the last pong, for status reporting.
    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        self.last_pong_at
    }
}
