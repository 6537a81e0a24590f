use std::time::Duration;

use url::Url;

/// Client configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base URL of the game server.
    pub ws_host: String,
    /// Room to join on startup.
    pub room: String,
    /// Bearer credential; without one no socket is opened.
    pub access_token: Option<String>,
    /// Local username, used to recognise our own draw offers and our colour.
    pub username: Option<String>,
    /// Fixed delay before reconnecting after an unexpected close.
    pub reconnect_delay_ms: u64,
    /// Close code the server uses to reject a credential.
    pub auth_close_code: u16,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = ClientConfig::default();
        ClientConfig {
            ws_host: std::env::var("CHESS_WS_HOST").unwrap_or(defaults.ws_host),
            room: std::env::var("CHESS_ROOM").unwrap_or(defaults.room),
            access_token: std::env::var("CHESS_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            username: std::env::var("CHESS_USERNAME")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            reconnect_delay_ms: std::env::var("CHESS_RECONNECT_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reconnect_delay_ms),
            auth_close_code: std::env::var("CHESS_AUTH_CLOSE_CODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.auth_close_code),
        }
    }

    /// Session settings derived from this configuration.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            host: self.ws_host.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            auth_close_code: self.auth_close_code,
            ..SessionConfig::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ws_host: "ws://localhost:8000".to_string(),
            room: "testroom".to_string(),
            access_token: None,
            username: None,
            reconnect_delay_ms: 2000,
            auth_close_code: 4001,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What a connection manager needs to know about the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub reconnect_delay: Duration,
    pub auth_close_code: u16,
    /// Reserved room id that addresses the lobby channel instead of a game.
    pub lobby_room: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: "ws://localhost:8000".to_string(),
            reconnect_delay: Duration::from_millis(2000),
            auth_close_code: 4001,
            lobby_room: "lobby".to_string(),
        }
    }
}

impl SessionConfig {
    /// Socket URL for `room`: `{host}/ws/game/{room}/?token=…`, or
    /// `{host}/ws/lobby/?token=…` for the lobby room.
    pub fn room_url(&self, room: &str, token: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.host).map_err(|e| format!("{}: {e}", self.host))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| format!("{} cannot be a base URL", self.host))?;
            segments.pop_if_empty();
            if room == self.lobby_room {
                segments.extend(["ws", "lobby", ""]);
            } else {
                segments.extend(["ws", "game", room, ""]);
            }
        }
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Where the session reads its bearer credential from. Consulted on every
/// connect, so a refreshed token is picked up by the next reconnect.
pub trait TokenSource: Send {
    fn token(&self) -> Option<String>;
}

impl TokenSource for Option<String> {
    fn token(&self) -> Option<String> {
        self.clone()
    }
}

impl TokenSource for String {
    fn token(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl TokenSource for &'static str {
    fn token(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

/// Token shared with whoever refreshes it.
impl TokenSource for std::sync::Arc<std::sync::Mutex<Option<String>>> {
    fn token(&self) -> Option<String> {
        self.lock().ok().and_then(|t| t.clone())
    }
}
