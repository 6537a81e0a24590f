//! Session events and the subscriber registry that fans them out.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receiving half handed to a subscriber.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// A unique ID assigned to each subscription.
pub type SubscriberId = u64;

/// Why and how a socket went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
    /// Closed by [`disconnect`](super::ConnectionManager::disconnect) rather
    /// than by the peer or the network.
    pub by_client: bool,
}

/// Everything the session reports to the rest of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Open { room: String },
    Close(CloseInfo),
    /// Transport error. Does not by itself close or reconnect.
    Error(String),
    /// Every well-formed inbound frame.
    Message(Value),
    /// The same frame again, for frames carrying a `type` discriminator.
    Frame { kind: String, payload: Value },
    /// A frame that was not valid JSON; it was dropped.
    Malformed { raw: String, error: String },
    /// `connect` was called without a credential.
    AuthRequired,
    /// The server closed with the authentication-failure code; no reconnect
    /// will follow.
    AuthFailed { code: u16 },
    /// `send` was called with no open socket; the frame was not sent.
    SendFailed { kind: String },
    /// A reconnect has been scheduled.
    Reconnecting { room: String, delay_ms: u64 },
}

/// Subscription key: a generic event class, or one frame type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Message,
    Malformed,
    AuthRequired,
    AuthFailed,
    SendFailed,
    Reconnecting,
    /// Type-specific frames, keyed by their `type` field.
    Frame(String),
}

impl EventKind {
    pub fn frame(kind: impl Into<String>) -> Self {
        EventKind::Frame(kind.into())
    }
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Open { .. } => EventKind::Open,
            SessionEvent::Close(_) => EventKind::Close,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::Message(_) => EventKind::Message,
            SessionEvent::Frame { kind, .. } => EventKind::Frame(kind.clone()),
            SessionEvent::Malformed { .. } => EventKind::Malformed,
            SessionEvent::AuthRequired => EventKind::AuthRequired,
            SessionEvent::AuthFailed { .. } => EventKind::AuthFailed,
            SessionEvent::SendFailed { .. } => EventKind::SendFailed,
            SessionEvent::Reconnecting { .. } => EventKind::Reconnecting,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Per-kind sets of subscribers, plus catch-all subscribers that see every
/// event. Subscribers whose receiver was dropped are pruned on publish.
#[derive(Debug)]
pub struct EventBus {
    /// kind → { subscriber_id → sender }
    subs: HashMap<EventKind, HashMap<SubscriberId, mpsc::UnboundedSender<SessionEvent>>>,
    all: HashMap<SubscriberId, mpsc::UnboundedSender<SessionEvent>>,
    next_id: SubscriberId,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus {
            subs: HashMap::new(),
            all: HashMap::new(),
            next_id: 1,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register for one kind of event, returning (subscriber_id, receiver).
    pub fn subscribe(&mut self, kind: EventKind) -> (SubscriberId, EventReceiver) {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(subscriber = id, ?kind, "subscribed");
        self.subs.entry(kind).or_default().insert(id, tx);
        (id, rx)
    }

    /// Register for every event.
    pub fn subscribe_all(&mut self) -> (SubscriberId, EventReceiver) {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(subscriber = id, "subscribed to all events");
        self.all.insert(id, tx);
        (id, rx)
    }

    /// Remove a subscription of any kind. Unknown IDs are ignored.
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.all.remove(&id);
        self.subs.retain(|_, clients| {
            clients.remove(&id);
            !clients.is_empty()
        });
        debug!(subscriber = id, "unsubscribed");
    }

    /// Deliver an event to its kind's subscribers and to catch-all
    /// subscribers.
    pub fn publish(&mut self, event: SessionEvent) {
        let kind = event.kind();

        if let Some(clients) = self.subs.get_mut(&kind) {
            clients.retain(|id, tx| {
                let alive = tx.send(event.clone()).is_ok();
                if !alive {
                    warn!(subscriber = id, ?kind, "removed stale subscriber");
                }
                alive
            });
            if clients.is_empty() {
                self.subs.remove(&kind);
            }
        }

        self.all.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                warn!(subscriber = id, "removed stale subscriber");
            }
            alive
        });
    }

    /// Number of subscribers for one kind (catch-all subscribers excluded).
    #[cfg(test)]
    fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.subs.get(kind).map_or(0, |c| c.len())
    }

    /// Total number of live subscriptions.
    #[cfg(test)]
    fn total_subscribers(&self) -> usize {
        self.subs.values().map(|c| c.len()).sum::<usize>() + self.all.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
