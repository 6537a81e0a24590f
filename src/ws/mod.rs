//! WebSocket module: the realtime session with the game server.
//!
//! - [`messages`]: Typed outbound commands and inbound normalisation.
//! - [`transport`]: Socket seam and the `tokio-tungstenite` connector.
//! - [`events`]: Session events and subscriber registry.
//! - [`manager`]: Identity-guarded connection manager.

pub mod events;
pub mod manager;
pub mod messages;
pub mod transport;

pub use events::{CloseInfo, EventKind, EventReceiver, SessionEvent, SubscriberId};
pub use manager::{ConnectionManager, SessionError, SessionState};
pub use messages::{ClientCommand, ServerEvent, Snapshot, Winner};
pub use transport::{Connector, Envelope, Inbox, Signal, SocketLink, SocketTag, WsConnector, WsLink};
