//! Client core for a server-driven two-player chess game.
//!
//! - [`ws`]: Realtime session with identity-guarded reconnect.
//! - [`engine`]: Board model, notation codec, legal-move reconciliation.
//! - [`game`]: State projection and the click-to-move controller.
//! - [`client`]: All of the above composed behind one handle.

pub mod client;
pub mod config;
pub mod engine;
pub mod game;
pub mod ws;

pub use client::GameClient;
pub use config::{ClientConfig, SessionConfig, TokenSource};
