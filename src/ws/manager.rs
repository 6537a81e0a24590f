//! Connection manager: one logical realtime session per room, kept alive
//! across reconnects.
//!
//! The manager owns at most one current socket. Sockets report through a
//! single inbox as tagged [`Envelope`]s; an envelope whose tag is not the
//! current socket's is dropped before it can touch session state. Reconnect
//! timers are tagged the same way, so a timer scheduled for a socket that has
//! since been superseded fires into nothing.

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TokenSource};

use super::events::{CloseInfo, EventBus, EventKind, EventReceiver, SessionEvent, SubscriberId};
use super::messages::ClientCommand;
use super::transport::{Connector, Envelope, Signal, SocketLink, SocketTag};

/// Errors returned by session operations. Each is also reported as an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no access token available")]
    MissingCredential,

    #[error("no open socket")]
    NotConnected,

    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    #[error("failed to serialize frame: {0}")]
    Serialize(String),
}

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    ReconnectWait,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Open => write!(f, "open"),
            SessionState::ReconnectWait => write!(f, "reconnect-wait"),
        }
    }
}

struct CurrentSocket<L> {
    tag: SocketTag,
    link: L,
}

struct PendingReconnect {
    tag: SocketTag,
    timer: JoinHandle<()>,
}

/// One logical session. Not shared between tasks: whoever composes the
/// client owns it and drives it with [`process_next`](Self::process_next).
pub struct ConnectionManager<C: Connector> {
    config: SessionConfig,
    connector: C,
    tokens: Box<dyn TokenSource>,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox_rx: mpsc::UnboundedReceiver<Envelope>,
    next_tag: u64,
    current: Option<CurrentSocket<C::Link>>,
    room: Option<String>,
    state: SessionState,
    reconnect: Option<PendingReconnect>,
    bus: EventBus,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(config: SessionConfig, connector: C, tokens: impl TokenSource + 'static) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        ConnectionManager {
            config,
            connector,
            tokens: Box::new(tokens),
            inbox_tx,
            inbox_rx,
            next_tag: 1,
            current: None,
            room: None,
            state: SessionState::Idle,
            reconnect: None,
            bus: EventBus::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Room of the session, kept across reconnects.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Tag of the current socket, if any.
    pub fn current_tag(&self) -> Option<SocketTag> {
        self.current.as_ref().map(|c| c.tag)
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------

    pub fn subscribe(&mut self, kind: EventKind) -> (SubscriberId, EventReceiver) {
        self.bus.subscribe(kind)
    }

    pub fn subscribe_all(&mut self) -> (SubscriberId, EventReceiver) {
        self.bus.subscribe_all()
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.bus.unsubscribe(id);
    }

    // -------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------

    /// Open a socket to `room`, retiring any previous socket first.
    pub fn connect(&mut self, room: &str) -> Result<(), SessionError> {
        self.cancel_reconnect();
        self.open_socket(room)
    }

    /// Send a command over the current socket with the current credential
    /// attached. Best effort: with no open socket or no credential this
    /// reports `SendFailed` and returns an error rather than queueing.
    pub fn send(&mut self, command: &ClientCommand) -> Result<(), SessionError> {
        let kind = command.kind();
        let open = self.state == SessionState::Open;
        let Some(current) = self.current.as_ref().filter(|_| open) else {
            warn!(kind, state = %self.state, "send without an open socket");
            self.bus.publish(SessionEvent::SendFailed {
                kind: kind.to_string(),
            });
            return Err(SessionError::NotConnected);
        };
        let Some(token) = self.tokens.token() else {
            warn!(kind, "send without an access token");
            self.bus.publish(SessionEvent::AuthRequired);
            self.bus.publish(SessionEvent::SendFailed {
                kind: kind.to_string(),
            });
            return Err(SessionError::MissingCredential);
        };

        let frame = command
            .to_frame(&token)
            .map_err(|e| SessionError::Serialize(e.to_string()))?;
        if current.link.send_text(frame.to_string()) {
            debug!(kind, "frame sent");
            Ok(())
        } else {
            warn!(kind, "socket refused frame");
            self.bus.publish(SessionEvent::SendFailed {
                kind: kind.to_string(),
            });
            Err(SessionError::NotConnected)
        }
    }

    /// Close the session for good: cancel any reconnect, detach and close the
    /// current socket. Idempotent; only a call that actually tore something
    /// down emits `close`.
    pub fn disconnect(&mut self) {
        let had_timer = self.cancel_reconnect();
        let had_socket = self.retire_current();
        self.state = SessionState::Idle;

        if had_timer || had_socket {
            info!(room = self.room.as_deref().unwrap_or(""), "disconnected by client");
            self.bus.publish(SessionEvent::Close(CloseInfo {
                code: None,
                reason: "client disconnect".into(),
                by_client: true,
            }));
        }
    }

    // -------------------------------------------------------------------
    // Event loop
    // -------------------------------------------------------------------

    /// Wait for the next socket or timer signal and handle it.
    pub async fn process_next(&mut self) {
        // The manager holds a sender, so the inbox never reports closed.
        if let Some(envelope) = self.inbox_rx.recv().await {
            self.handle(envelope);
        }
    }

    /// Handle every signal already queued, without waiting. Returns how many
    /// were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.inbox_rx.try_recv() {
            self.handle(envelope);
            handled += 1;
        }
        handled
    }

    /// Apply one signal. Signals from any socket other than the current one
    /// are dropped.
    pub fn handle(&mut self, envelope: Envelope) {
        let Envelope { tag, signal } = envelope;

        if signal == Signal::ReconnectDue {
            self.on_reconnect_due(tag);
            return;
        }

        if self.current_tag() != Some(tag) {
            debug!(socket = %tag, ?signal, "dropping signal from retired socket");
            return;
        }

        match signal {
            Signal::Open => self.on_open(tag),
            Signal::Text(raw) => self.on_text(raw),
            Signal::Failed(error) => {
                warn!(socket = %tag, %error, "socket error");
                self.bus.publish(SessionEvent::Error(error));
            }
            Signal::Closed { code, reason } => self.on_closed(tag, code, reason),
            Signal::ReconnectDue => {}
        }
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn open_socket(&mut self, room: &str) -> Result<(), SessionError> {
        let Some(token) = self.tokens.token() else {
            warn!(room, "connect without an access token");
            self.bus.publish(SessionEvent::AuthRequired);
            return Err(SessionError::MissingCredential);
        };
        let url = match self.config.room_url(room, &token) {
            Ok(url) => url,
            Err(e) => {
                warn!(room, error = %e, "cannot build socket url");
                self.bus.publish(SessionEvent::Error(format!("invalid socket url: {e}")));
                return Err(SessionError::InvalidUrl(e));
            }
        };

        self.retire_current();

        let tag = SocketTag(self.next_tag);
        self.next_tag += 1;
        let link = self.connector.open(&url, tag, self.inbox_tx.clone());

        info!(room, socket = %tag, "connecting");
        self.current = Some(CurrentSocket { tag, link });
        self.room = Some(room.to_string());
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// Forget the current socket, then close it. Returns whether there was
    /// one.
    fn retire_current(&mut self) -> bool {
        match self.current.take() {
            Some(mut old) => {
                debug!(socket = %old.tag, "retiring socket");
                old.link.close();
                true
            }
            None => false,
        }
    }

    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(pending) => {
                pending.timer.abort();
                debug!(socket = %pending.tag, "reconnect cancelled");
                true
            }
            None => false,
        }
    }

    fn on_open(&mut self, tag: SocketTag) {
        self.cancel_reconnect();
        self.state = SessionState::Open;
        let room = self.room.clone().unwrap_or_default();
        info!(room = %room, socket = %tag, "socket open");
        self.bus.publish(SessionEvent::Open { room });
    }

    fn on_text(&mut self, raw: String) {
        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                self.bus.publish(SessionEvent::Malformed {
                    raw,
                    error: e.to_string(),
                });
                return;
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!(kind = kind.as_deref().unwrap_or("-"), "frame received");

        self.bus.publish(SessionEvent::Message(value.clone()));
        if let Some(kind) = kind {
            self.bus.publish(SessionEvent::Frame {
                kind,
                payload: value,
            });
        }
    }

    fn on_closed(&mut self, tag: SocketTag, code: Option<u16>, reason: String) {
        self.retire_current();
        let room = self.room.clone().unwrap_or_default();
        info!(room = %room, socket = %tag, ?code, %reason, "socket closed");
        self.bus.publish(SessionEvent::Close(CloseInfo {
            code,
            reason,
            by_client: false,
        }));

        if code == Some(self.config.auth_close_code) {
            warn!(room = %room, socket = %tag, "credential rejected; not reconnecting");
            self.state = SessionState::Idle;
            self.bus.publish(SessionEvent::AuthFailed {
                code: self.config.auth_close_code,
            });
            return;
        }

        self.schedule_reconnect(tag, room);
    }

    fn schedule_reconnect(&mut self, tag: SocketTag, room: String) {
        self.cancel_reconnect();
        let delay = self.config.reconnect_delay;
        let inbox = self.inbox_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Envelope::new(tag, Signal::ReconnectDue));
        });

        self.reconnect = Some(PendingReconnect { tag, timer });
        self.state = SessionState::ReconnectWait;
        debug!(room = %room, socket = %tag, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.bus.publish(SessionEvent::Reconnecting {
            room,
            delay_ms: delay.as_millis() as u64,
        });
    }

    /// A reconnect fires only if it is still the pending one and no socket
    /// has been created since it was scheduled.
    fn on_reconnect_due(&mut self, tag: SocketTag) {
        let pending = self.reconnect.as_ref().is_some_and(|p| p.tag == tag);
        if !pending || self.current.is_some() {
            debug!(socket = %tag, "dropping stale reconnect");
            return;
        }
        self.reconnect = None;

        let Some(room) = self.room.clone() else {
            self.state = SessionState::Idle;
            return;
        };
        info!(room = %room, "reconnecting");
        if let Err(e) = self.open_socket(&room) {
            warn!(room = %room, error = %e, "reconnect failed");
            self.state = SessionState::Idle;
        }
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.cancel_reconnect();
        self.retire_current();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use url::Url;

    use crate::ws::transport::Inbox;

    /// What the fake connector saw for one socket.
    #[derive(Debug, Default)]
    struct FakeSocket {
        url: String,
        inbox: Option<Inbox>,
        sent: Vec<String>,
        closed: bool,
    }

    type Sockets = Arc<Mutex<Vec<FakeSocket>>>;

    struct FakeConnector {
        sockets: Sockets,
    }

    struct FakeLink {
        index: usize,
        sockets: Sockets,
    }

    impl SocketLink for FakeLink {
        fn send_text(&self, text: String) -> bool {
            let mut sockets = self.sockets.lock().unwrap();
            let socket = &mut sockets[self.index];
            if socket.closed {
                return false;
            }
            socket.sent.push(text);
            true
        }

        fn close(&mut self) {
            self.sockets.lock().unwrap()[self.index].closed = true;
        }
    }

    impl Connector for FakeConnector {
        type Link = FakeLink;

        fn open(&mut self, url: &Url, _tag: SocketTag, inbox: Inbox) -> FakeLink {
            let mut sockets = self.sockets.lock().unwrap();
            sockets.push(FakeSocket {
                url: url.to_string(),
                inbox: Some(inbox),
                ..FakeSocket::default()
            });
            FakeLink {
                index: sockets.len() - 1,
                sockets: self.sockets.clone(),
            }
        }
    }

    fn manager(token: Option<&str>) -> (ConnectionManager<FakeConnector>, Sockets) {
        let sockets: Sockets = Arc::default();
        let mgr = ConnectionManager::new(
            SessionConfig::default(),
            FakeConnector {
                sockets: sockets.clone(),
            },
            token.map(str::to_string),
        );
        (mgr, sockets)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    fn open_tag(mgr: &mut ConnectionManager<FakeConnector>) -> SocketTag {
        let tag = mgr.current_tag().unwrap();
        mgr.handle(Envelope::new(tag, Signal::Open));
        tag
    }

    // -------------------------------------------------------------------
    // Connect / open
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn connect_without_token_reports_auth_required() {
        let (mut mgr, sockets) = manager(None);
        let (_, mut rx) = mgr.subscribe(EventKind::AuthRequired);

        assert_eq!(mgr.connect("r1"), Err(SessionError::MissingCredential));
        assert_eq!(drain(&mut rx), [SessionEvent::AuthRequired]);
        assert!(sockets.lock().unwrap().is_empty());
        assert_eq!(mgr.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connect_opens_socket_with_token_in_url() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();

        assert_eq!(mgr.state(), SessionState::Connecting);
        assert_eq!(
            sockets.lock().unwrap()[0].url,
            "ws://localhost:8000/ws/game/r1/?token=tok"
        );
    }

    #[tokio::test]
    async fn open_signal_marks_session_open() {
        let (mut mgr, _sockets) = manager(Some("tok"));
        let (_, mut rx) = mgr.subscribe(EventKind::Open);
        mgr.connect("r1").unwrap();
        open_tag(&mut mgr);

        assert!(mgr.is_open());
        assert_eq!(
            drain(&mut rx),
            [SessionEvent::Open {
                room: "r1".into()
            }]
        );
    }

    #[tokio::test]
    async fn signals_flow_through_inbox() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();
        let tag = mgr.current_tag().unwrap();
        let inbox = sockets.lock().unwrap()[0].inbox.clone().unwrap();
        inbox.send(Envelope::new(tag, Signal::Open)).unwrap();

        mgr.process_next().await;
        assert!(mgr.is_open());
        assert_eq!(mgr.process_pending(), 0);
    }

    // -------------------------------------------------------------------
    // Frames
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn frames_emit_generic_and_typed_events() {
        let (mut mgr, _sockets) = manager(Some("tok"));
        let (_, mut all) = mgr.subscribe(EventKind::Message);
        let (_, mut moves) = mgr.subscribe(EventKind::frame("move"));
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.handle(Envelope::new(tag, Signal::Text(r#"{"type":"move","move":{}}"#.into())));
        mgr.handle(Envelope::new(tag, Signal::Text(r#"{"no_type":1}"#.into())));

        assert_eq!(drain(&mut all).len(), 2);
        let typed = drain(&mut moves);
        assert_eq!(typed.len(), 1);
        assert!(matches!(&typed[0], SessionEvent::Frame { kind, .. } if kind == "move"));
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_session_survives() {
        let (mut mgr, _sockets) = manager(Some("tok"));
        let (_, mut bad) = mgr.subscribe(EventKind::Malformed);
        let (_, mut msgs) = mgr.subscribe(EventKind::Message);
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.handle(Envelope::new(tag, Signal::Text("{not json".into())));
        mgr.handle(Envelope::new(tag, Signal::Text(r#"{"type":"sync"}"#.into())));

        assert_eq!(drain(&mut bad).len(), 1);
        assert_eq!(drain(&mut msgs).len(), 1);
        assert!(mgr.is_open());
    }

    #[tokio::test]
    async fn error_signal_does_not_close() {
        let (mut mgr, _sockets) = manager(Some("tok"));
        let (_, mut errors) = mgr.subscribe(EventKind::Error);
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.handle(Envelope::new(tag, Signal::Failed("boom".into())));

        assert_eq!(drain(&mut errors), [SessionEvent::Error("boom".into())]);
        assert!(mgr.is_open());
        assert!(!mgr.has_pending_reconnect());
    }

    // -------------------------------------------------------------------
    // Send
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn send_attaches_token() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();
        open_tag(&mut mgr);

        mgr.send(&ClientCommand::Resign).unwrap();

        let sent = sockets.lock().unwrap()[0].sent.clone();
        let frame: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame, serde_json::json!({"type": "resign", "token": "tok"}));
    }

    #[tokio::test]
    async fn send_reads_refreshed_token() {
        let sockets: Sockets = Arc::default();
        let shared = Arc::new(Mutex::new(Some("old".to_string())));
        let mut mgr = ConnectionManager::new(
            SessionConfig::default(),
            FakeConnector {
                sockets: sockets.clone(),
            },
            shared.clone(),
        );
        mgr.connect("r1").unwrap();
        open_tag(&mut mgr);

        *shared.lock().unwrap() = Some("fresh".to_string());
        mgr.send(&ClientCommand::Resign).unwrap();

        let sent = sockets.lock().unwrap()[0].sent.clone();
        let frame: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["token"], "fresh");
        assert!(sockets.lock().unwrap()[0].url.ends_with("token=old"));
    }

    #[tokio::test]
    async fn send_after_token_cleared_requires_auth() {
        let sockets: Sockets = Arc::default();
        let shared = Arc::new(Mutex::new(Some("tok".to_string())));
        let mut mgr = ConnectionManager::new(
            SessionConfig::default(),
            FakeConnector {
                sockets: sockets.clone(),
            },
            shared.clone(),
        );
        let (_, mut events) = mgr.subscribe_all();
        mgr.connect("r1").unwrap();
        open_tag(&mut mgr);
        drain(&mut events);

        *shared.lock().unwrap() = None;
        assert_eq!(
            mgr.send(&ClientCommand::Resign),
            Err(SessionError::MissingCredential)
        );
        assert_eq!(
            drain(&mut events),
            [
                SessionEvent::AuthRequired,
                SessionEvent::SendFailed {
                    kind: "resign".into()
                }
            ]
        );
        assert!(sockets.lock().unwrap()[0].sent.is_empty());
    }

    #[tokio::test]
    async fn bad_host_reports_error_event() {
        let sockets: Sockets = Arc::default();
        let config = SessionConfig {
            host: "not a url".into(),
            ..SessionConfig::default()
        };
        let mut mgr = ConnectionManager::new(
            config,
            FakeConnector {
                sockets: sockets.clone(),
            },
            "tok",
        );
        let (_, mut errors) = mgr.subscribe(EventKind::Error);

        assert!(matches!(mgr.connect("r1"), Err(SessionError::InvalidUrl(_))));
        assert_eq!(drain(&mut errors).len(), 1);
        assert!(sockets.lock().unwrap().is_empty());
        assert_eq!(mgr.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn send_before_open_fails_softly() {
        let (mut mgr, sockets) = manager(Some("tok"));
        let (_, mut failed) = mgr.subscribe(EventKind::SendFailed);

        assert_eq!(
            mgr.send(&ClientCommand::SyncRequest),
            Err(SessionError::NotConnected)
        );
        mgr.connect("r1").unwrap();
        assert_eq!(
            mgr.send(&ClientCommand::SyncRequest),
            Err(SessionError::NotConnected)
        );

        assert_eq!(drain(&mut failed).len(), 2);
        assert!(sockets.lock().unwrap()[0].sent.is_empty());
    }

    // -------------------------------------------------------------------
    // Identity guard
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn second_connect_retires_first_socket() {
        let (mut mgr, sockets) = manager(Some("tok"));
        let (_, mut all) = mgr.subscribe_all();
        mgr.connect("r1").unwrap();
        let first = mgr.current_tag().unwrap();
        mgr.connect("r1").unwrap();
        let second = mgr.current_tag().unwrap();

        assert_ne!(first, second);
        assert!(sockets.lock().unwrap()[0].closed);
        assert!(!sockets.lock().unwrap()[1].closed);

        // The old socket's late events change nothing.
        mgr.handle(Envelope::new(first, Signal::Open));
        mgr.handle(Envelope::new(first, Signal::Text(r#"{"type":"sync"}"#.into())));
        mgr.handle(Envelope::new(
            first,
            Signal::Closed {
                code: Some(1006),
                reason: String::new(),
            },
        ));

        assert!(drain(&mut all).is_empty());
        assert_eq!(mgr.current_tag(), Some(second));
        assert_eq!(mgr.state(), SessionState::Connecting);
        assert!(!mgr.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reconnect_timer_is_neutralised() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();
        let first = open_tag(&mut mgr);

        // First socket drops: a reconnect is scheduled for it.
        mgr.handle(Envelope::new(
            first,
            Signal::Closed {
                code: Some(1006),
                reason: String::new(),
            },
        ));
        assert!(mgr.has_pending_reconnect());

        // A manual connect supersedes it before the timer fires.
        mgr.connect("r1").unwrap();
        assert!(!mgr.has_pending_reconnect());

        // Even a ReconnectDue that slipped through is ignored.
        mgr.handle(Envelope::new(first, Signal::ReconnectDue));
        tokio::time::sleep(Duration::from_secs(5)).await;
        mgr.process_pending();

        assert_eq!(sockets.lock().unwrap().len(), 2);
    }

    // -------------------------------------------------------------------
    // Close & reconnect
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_reconnects_after_delay() {
        let (mut mgr, sockets) = manager(Some("tok"));
        let (_, mut all) = mgr.subscribe_all();
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.handle(Envelope::new(
            tag,
            Signal::Closed {
                code: Some(1006),
                reason: "gone".into(),
            },
        ));
        assert_eq!(mgr.state(), SessionState::ReconnectWait);
        assert_eq!(mgr.current_tag(), None);

        let events = drain(&mut all);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Close(info) if !info.by_client)));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Reconnecting { delay_ms: 2000, .. })));

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(mgr.process_pending(), 0);

        mgr.process_next().await;
        assert_eq!(sockets.lock().unwrap().len(), 2);
        assert_eq!(mgr.state(), SessionState::Connecting);
        assert_eq!(mgr.room(), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn open_cancels_pending_reconnect() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);
        mgr.handle(Envelope::new(
            tag,
            Signal::Closed {
                code: None,
                reason: String::new(),
            },
        ));

        mgr.process_next().await;
        open_tag(&mut mgr);
        assert!(!mgr.has_pending_reconnect());
        assert!(mgr.is_open());
        assert_eq!(sockets.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_close_code_stops_reconnecting() {
        let (mut mgr, sockets) = manager(Some("tok"));
        let (_, mut auth) = mgr.subscribe(EventKind::AuthFailed);
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.handle(Envelope::new(
            tag,
            Signal::Closed {
                code: Some(4001),
                reason: "bad token".into(),
            },
        ));

        assert_eq!(drain(&mut auth), [SessionEvent::AuthFailed { code: 4001 }]);
        assert_eq!(mgr.state(), SessionState::Idle);
        assert!(!mgr.has_pending_reconnect());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mgr.process_pending(), 0);
        assert_eq!(sockets.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_without_token_reports_auth_required() {
        let shared = Arc::new(Mutex::new(Some("tok".to_string())));
        let sockets: Sockets = Arc::default();
        let mut mgr = ConnectionManager::new(
            SessionConfig::default(),
            FakeConnector {
                sockets: sockets.clone(),
            },
            shared.clone(),
        );
        let (_, mut auth) = mgr.subscribe(EventKind::AuthRequired);
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        *shared.lock().unwrap() = None;
        mgr.handle(Envelope::new(
            tag,
            Signal::Closed {
                code: None,
                reason: String::new(),
            },
        ));
        mgr.process_next().await;

        assert_eq!(drain(&mut auth), [SessionEvent::AuthRequired]);
        assert_eq!(mgr.state(), SessionState::Idle);
        assert_eq!(sockets.lock().unwrap().len(), 1);
    }

    // -------------------------------------------------------------------
    // Disconnect
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn disconnect_closes_and_reports_client_close() {
        let (mut mgr, sockets) = manager(Some("tok"));
        let (_, mut closes) = mgr.subscribe(EventKind::Close);
        mgr.connect("r1").unwrap();
        let tag = open_tag(&mut mgr);

        mgr.disconnect();

        assert_eq!(mgr.state(), SessionState::Idle);
        assert!(sockets.lock().unwrap()[0].closed);
        let events = drain(&mut closes);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SessionEvent::Close(info) if info.by_client));

        // The retired socket's own close arrives later and is ignored.
        mgr.handle(Envelope::new(
            tag,
            Signal::Closed {
                code: Some(1000),
                reason: String::new(),
            },
        ));
        assert!(drain(&mut closes).is_empty());
        assert!(!mgr.has_pending_reconnect());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (mut mgr, _sockets) = manager(Some("tok"));
        let (_, mut closes) = mgr.subscribe(EventKind::Close);

        mgr.disconnect();
        mgr.connect("r1").unwrap();
        mgr.disconnect();
        mgr.disconnect();

        assert_eq!(drain(&mut closes).len(), 1);
        assert_eq!(mgr.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_then_connect_has_one_live_socket() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("r1").unwrap();
        let first = open_tag(&mut mgr);
        mgr.handle(Envelope::new(
            first,
            Signal::Closed {
                code: None,
                reason: String::new(),
            },
        ));
        assert!(mgr.has_pending_reconnect());

        mgr.disconnect();
        mgr.connect("r1").unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        mgr.process_pending();

        let sockets = sockets.lock().unwrap();
        assert_eq!(sockets.len(), 2);
        assert_eq!(sockets.iter().filter(|s| !s.closed).count(), 1);
        assert!(!mgr.has_pending_reconnect());
    }

    #[tokio::test]
    async fn lobby_room_uses_lobby_path() {
        let (mut mgr, sockets) = manager(Some("tok"));
        mgr.connect("lobby").unwrap();
        assert_eq!(
            sockets.lock().unwrap()[0].url,
            "ws://localhost:8000/ws/lobby/?token=tok"
        );
    }
}
