//! Socket transport seam.
//!
//! Every socket the session opens gets a fresh [`SocketTag`]. Whatever the
//! socket observes (open, text, close, failure) is posted into the session's
//! inbox as an [`Envelope`] stamped with that tag, so the session can tell a
//! live socket's signals from those of one it already retired.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

/// Generation number of one socket instance within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketTag(pub u64);

impl std::fmt::Display for SocketTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a socket (or a timer acting on its behalf) reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Open,
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Failed(String),
    /// The reconnect delay scheduled after this socket closed has elapsed.
    ReconnectDue,
}

/// A signal together with the socket it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub tag: SocketTag,
    pub signal: Signal,
}

impl Envelope {
    pub fn new(tag: SocketTag, signal: Signal) -> Self {
        Envelope { tag, signal }
    }
}

/// Sending half of a session's inbox.
pub type Inbox = mpsc::UnboundedSender<Envelope>;

/// Handle on one open (or opening) socket.
pub trait SocketLink: Send {
    /// Queue a text frame. Returns `false` if the socket can no longer take
    /// frames.
    fn send_text(&self, text: String) -> bool;

    /// Detach and close. After this the socket posts nothing further.
    fn close(&mut self);
}

/// Opens sockets for a session.
pub trait Connector: Send {
    type Link: SocketLink;

    /// Start opening a socket to `url`. Progress is reported through
    /// `inbox`, tagged with `tag`.
    fn open(&mut self, url: &Url, tag: SocketTag, inbox: Inbox) -> Self::Link;
}

// ---------------------------------------------------------------------------
// tokio-tungstenite implementation
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Link to a socket driven by a background task.
#[derive(Debug)]
pub struct WsLink {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketLink for WsLink {
    fn send_text(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Connector backed by `tokio-tungstenite`. Must be used inside a tokio
/// runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Link = WsLink;

    fn open(&mut self, url: &Url, tag: SocketTag, inbox: Inbox) -> WsLink {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(socket_task(url.to_string(), tag, inbox, rx));
        WsLink { outbound: tx }
    }
}

fn post(inbox: &Inbox, tag: SocketTag, signal: Signal) {
    // The session may already be gone; nothing left to tell.
    let _ = inbox.send(Envelope::new(tag, signal));
}

/// Drives one socket from connect to close. Exits silently once the link
/// asks it to close or is dropped, so a retired socket never reports.
async fn socket_task(
    url: String,
    tag: SocketTag,
    inbox: Inbox,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    debug!(socket = %tag, "connecting");

    let connected = tokio::select! {
        res = connect_async(url.as_str()) => res,
        _ = outbound.recv() => {
            // Only a close (or a dropped link) can arrive before open.
            debug!(socket = %tag, "retired before open");
            return;
        }
    };

    let (ws, _response) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            warn!(socket = %tag, error = %e, "connect failed");
            post(&inbox, tag, Signal::Failed(e.to_string()));
            post(
                &inbox,
                tag,
                Signal::Closed {
                    code: None,
                    reason: "connect failed".into(),
                },
            );
            return;
        }
    };

    post(&inbox, tag, Signal::Open);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!(socket = %tag, error = %e, "send failed");
                        post(&inbox, tag, Signal::Failed(e.to_string()));
                        post(&inbox, tag, Signal::Closed { code: None, reason: e.to_string() });
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    debug!(socket = %tag, "closed by client");
                    break;
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    post(&inbox, tag, Signal::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    debug!(socket = %tag, ?code, "closed by server");
                    post(&inbox, tag, Signal::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(socket = %tag, error = %e, "receive failed");
                    post(&inbox, tag, Signal::Failed(e.to_string()));
                    post(&inbox, tag, Signal::Closed { code: None, reason: e.to_string() });
                    break;
                }
                None => {
                    post(&inbox, tag, Signal::Closed { code: None, reason: "stream ended".into() });
                    break;
                }
            },
        }
    }
}
