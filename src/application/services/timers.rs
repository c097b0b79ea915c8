//! Timer table for one connection manager.
//!
//! Every deferred action the manager owns lives here, keyed by kind, so a
//! single `clear` cancels all of them and nothing leaks across reconnect
//! cycles.

use std::collections::BTreeMap;

use tokio::time::Instant;

/// Deferred actions owned by a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Abandon a socket that has not reached Open
    ConnectTimeout,
    /// Next retry after a failure
    ReconnectDelay,
    /// Deferred connect request inside the debounce window
    Debounce,
    /// Next ping
    Heartbeat,
    /// Token expiry inspection or proactive reconnect
    TokenRefresh,
}

impl TimerKind {
    /// Timers that only make sense while a socket exists or is being opened.
    pub const CONNECTION_SCOPED: [TimerKind; 3] = [
        TimerKind::ConnectTimeout,
        TimerKind::Heartbeat,
        TimerKind::TokenRefresh,
    ];
}

/// At most one pending deadline per kind
#[derive(Debug, Default)]
pub struct Timers {
    deadlines: BTreeMap<TimerKind, Instant>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, replacing any pending deadline of the same kind.
    pub fn schedule(&mut self, kind: TimerKind, at: Instant) {
        self.deadlines.insert(kind, at);
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self, kinds: &[TimerKind]) {
        for kind in kinds {
            self.deadlines.remove(kind);
        }
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines.get(&kind).copied()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }

    /// Remove and return the earliest timer due at `now`.
    ///
    /// Callers drain one timer at a time, so a handler that cancels other
    /// timers takes effect before they are considered. Ties are broken by
    /// kind order: a connect timeout is handled before a heartbeat that
    /// expires at the same instant.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerKind> {
        let (_, kind) = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(kind, at)| (*at, *kind))
            .min()?;
        self.deadlines.remove(&kind);
        Some(kind)
    }
}
