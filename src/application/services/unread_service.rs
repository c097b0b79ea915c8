//! Unread Service
//!
//! Keeps a total unread count from incremental chat traffic, corrected by
//! an authoritative snapshot every time the channel is (re)established.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::connection_manager::ConnectionManager;
use crate::application::dto::{extract_unread_count, InboundMessage, TYPE_CONNECTION_ESTABLISHED};
use crate::shared::error::ClientResult;

/// Default number of message ids remembered for de-duplication
pub const DEFAULT_DEDUP_WINDOW: usize = 512;

/// Authoritative unread count
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_unread_count(&self) -> ClientResult<u64>;
}

pub type CountHandler = Arc<dyn Fn(u64) + Send + Sync>;

/// Bounded set of recently counted message ids
#[derive(Debug)]
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: String) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }
}

#[derive(Debug)]
struct Counts {
    total: u64,
    /// Local increments since the last authoritative value
    per_conversation: HashMap<String, u64>,
    active_conversation: Option<String>,
    local_user: Option<String>,
    seen: SeenIds,
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    counts: Mutex<Counts>,
    handlers: RwLock<Vec<CountHandler>>,
    fetch_generation: AtomicU64,
}

/// Unread-count bookkeeping attached to a chat channel
#[derive(Clone)]
pub struct UnreadTracker {
    inner: Arc<Inner>,
}

impl UnreadTracker {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self::with_dedup_window(source, DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_dedup_window(source: Arc<dyn SnapshotSource>, window: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                counts: Mutex::new(Counts {
                    total: 0,
                    per_conversation: HashMap::new(),
                    active_conversation: None,
                    local_user: None,
                    seen: SeenIds::new(window),
                }),
                handlers: RwLock::new(Vec::new()),
                fetch_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.counts.lock().total
    }

    /// Local increments for one conversation since the last snapshot
    pub fn conversation_count(&self, conversation_id: &str) -> u64 {
        self.inner
            .counts
            .lock()
            .per_conversation
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.inner.counts.lock().active_conversation.clone()
    }

    /// Messages from this user never count as unread.
    pub fn set_local_user(&self, user_id: impl Into<String>) {
        self.inner.counts.lock().local_user = Some(user_id.into());
    }

    /// Mark a conversation as being viewed; its local contribution is cleared.
    pub fn set_active_conversation(&self, conversation_id: Option<String>) {
        let changed = {
            let mut counts = self.inner.counts.lock();
            counts.active_conversation = conversation_id.clone();
            conversation_id.and_then(|id| clear_conversation(&mut counts, &id))
        };
        if let Some(total) = changed {
            self.notify(total);
        }
    }

    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    /// Subscribe to a manager's message stream.
    pub fn attach(&self, manager: &ConnectionManager) {
        let tracker = self.clone();
        manager.on_message(move |message| tracker.handle(message));
    }

    /// Apply one inbound message.
    pub fn handle(&self, message: &InboundMessage) {
        match message.kind() {
            TYPE_CONNECTION_ESTABLISHED => {
                if let Some(user_id) = message.id_field("user_id") {
                    let mut counts = self.inner.counts.lock();
                    if counts.local_user.is_none() {
                        counts.local_user = Some(user_id);
                    }
                }
                self.refresh();
            }
            "chat_message" | "new_message" => {
                if let Some(payload) = message.payload() {
                    self.on_new_message(payload);
                }
            }
            "unread_count" | "unread_count_update" => {
                match message.payload().and_then(extract_unread_count) {
                    Some(total) => {
                        // A push is newer than any snapshot still in flight
                        self.inner.fetch_generation.fetch_add(1, Ordering::SeqCst);
                        self.set_total(total);
                    }
                    None => tracing::debug!(kind = message.kind(), "Unread push without a count"),
                }
            }
            "messages_read" => {
                if let Some(conversation_id) = message.payload().and_then(conversation_of) {
                    let changed = clear_conversation(&mut self.inner.counts.lock(), &conversation_id);
                    if let Some(total) = changed {
                        self.notify(total);
                    }
                }
            }
            _ => {}
        }
    }

    /// Fetch the authoritative count; only the newest fetch is applied.
    pub fn refresh(&self) -> JoinHandle<()> {
        let generation = self.inner.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tracker = self.clone();

        tokio::spawn(async move {
            match tracker.inner.source.fetch_unread_count().await {
                Ok(total) => {
                    if tracker.inner.fetch_generation.load(Ordering::SeqCst) != generation {
                        tracing::debug!(generation, "Discarding superseded unread snapshot");
                        return;
                    }
                    tracing::debug!(total, "Unread snapshot applied");
                    tracker.set_total(total);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unread snapshot failed; keeping local count");
                }
            }
        })
    }

    fn on_new_message(&self, payload: &Value) {
        let conversation = conversation_of(payload);
        let total = {
            let mut counts = self.inner.counts.lock();

            if let Some(id) = message_id_of(payload) {
                if !counts.seen.insert(id) {
                    return;
                }
            }
            if conversation.is_some() && conversation == counts.active_conversation {
                return;
            }
            if let (Some(sender), Some(me)) = (sender_of(payload), counts.local_user.as_ref()) {
                if &sender == me {
                    return;
                }
            }

            counts.total += 1;
            if let Some(conversation) = conversation {
                *counts.per_conversation.entry(conversation).or_insert(0) += 1;
            }
            counts.total
        };
        self.notify(total);
    }

    fn set_total(&self, total: u64) {
        let changed = {
            let mut counts = self.inner.counts.lock();
            counts.per_conversation.clear();
            let changed = counts.total != total;
            counts.total = total;
            changed
        };
        if changed {
            self.notify(total);
        }
    }

    fn notify(&self, total: u64) {
        let handlers = self.inner.handlers.read().clone();
        for handler in handlers {
            handler(total);
        }
    }
}

/// Remove a conversation's local contribution; returns the new total if it changed.
fn clear_conversation(counts: &mut Counts, conversation_id: &str) -> Option<u64> {
    let local = counts.per_conversation.remove(conversation_id)?;
    if local == 0 {
        return None;
    }
    counts.total = counts.total.saturating_sub(local);
    Some(counts.total)
}

/// Look a key up at the top level, then inside a nested `message` object.
fn lookup<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload
        .get(key)
        .or_else(|| payload.get("message").and_then(|m| m.get(key)))
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn conversation_of(payload: &Value) -> Option<String> {
    lookup(payload, "conversation_id").and_then(as_id)
}

fn message_id_of(payload: &Value) -> Option<String> {
    lookup(payload, "message_id")
        .or_else(|| lookup(payload, "id"))
        .and_then(as_id)
}

fn sender_of(payload: &Value) -> Option<String> {
    if let Some(id) = lookup(payload, "sender_id").and_then(as_id) {
        return Some(id);
    }
    lookup(payload, "sender").and_then(|sender| match sender {
        Value::Object(_) => sender.get("id").and_then(as_id),
        other => as_id(other),
    })
}
