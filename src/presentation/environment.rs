//! Environment Signals
//!
//! Fans host visibility and network changes out to every registered
//! channel. The monitor holds weak references, so it never keeps a
//! manager alive.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::application::services::ConnectionManager;
pub use crate::domain::EnvironmentSignal;

#[derive(Clone, Default)]
pub struct EnvironmentMonitor {
    managers: Arc<RwLock<Vec<Weak<ConnectionManager>>>>,
}

impl EnvironmentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, manager: &Arc<ConnectionManager>) {
        self.managers.write().push(Arc::downgrade(manager));
    }

    /// Deliver a signal; returns how many managers received it.
    ///
    /// Dropped or shut-down managers are forgotten.
    pub fn notify(&self, signal: EnvironmentSignal) -> usize {
        let live: Vec<Arc<ConnectionManager>> = {
            let mut managers = self.managers.write();
            managers.retain(|manager| manager.strong_count() > 0);
            managers.iter().filter_map(Weak::upgrade).collect()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for manager in &live {
            match manager.notify_environment(signal) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(Arc::downgrade(manager)),
            }
        }

        if !closed.is_empty() {
            self.managers
                .write()
                .retain(|manager| !closed.iter().any(|gone| gone.ptr_eq(manager)));
        }

        tracing::debug!(signal = ?signal, delivered, "Environment signal delivered");
        delivered
    }

    pub fn len(&self) -> usize {
        self.managers
            .read()
            .iter()
            .filter(|manager| manager.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
