//! Message dispatcher
//!
//! Routes inbound messages to handlers registered per `type` tag, with an
//! optional fallback for tags nobody claimed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection_manager::{ConnectionManager, MessageHandler};
use crate::application::dto::InboundMessage;

#[derive(Default)]
struct Routes {
    by_kind: HashMap<String, Vec<MessageHandler>>,
    fallback: Option<MessageHandler>,
}

/// Strategy table from `type` tag to handlers
#[derive(Clone, Default)]
pub struct MessageDispatcher {
    routes: Arc<RwLock<Routes>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one tag. Handlers for a tag run in
    /// registration order.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.routes
            .write()
            .by_kind
            .entry(kind.into())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Handler for tags without a registered route; replaces any previous one.
    pub fn fallback<F>(&self, handler: F) -> &Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.routes.write().fallback = Some(Arc::new(handler));
        self
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.routes.read().by_kind.contains_key(kind)
    }

    /// Deliver one message. Returns whether a handler saw it.
    pub fn dispatch(&self, message: &InboundMessage) -> bool {
        let handlers = {
            let routes = self.routes.read();
            match routes.by_kind.get(message.kind()) {
                Some(handlers) => handlers.clone(),
                None => routes.fallback.iter().cloned().collect(),
            }
        };

        if handlers.is_empty() {
            tracing::trace!(kind = message.kind(), "No handler for message");
            return false;
        }
        for handler in handlers {
            handler(message);
        }
        true
    }

    /// Subscribe this table to a manager's message stream.
    pub fn attach(&self, manager: &ConnectionManager) {
        let dispatcher = self.clone();
        manager.on_message(move |message| {
            dispatcher.dispatch(message);
        });
    }
}
