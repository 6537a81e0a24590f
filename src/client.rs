//! The composed client: one session, the view it feeds, and the move
//! controller. This is the whole surface a UI needs.

use tracing::{info, warn};

use crate::config::{ClientConfig, TokenSource};
use crate::engine::legal::MatchPolicy;
use crate::engine::types::{PieceType, Square};
use crate::game::controller::{ClickOutcome, MoveController};
use crate::game::view::ViewModel;
use crate::ws::events::{EventReceiver, SessionEvent};
use crate::ws::manager::{ConnectionManager, SessionError, SessionState};
use crate::ws::messages::ClientCommand;
use crate::ws::transport::Connector;

pub struct GameClient<C: Connector> {
    session: ConnectionManager<C>,
    events: EventReceiver,
    view: ViewModel,
    controller: MoveController,
}

impl<C: Connector> GameClient<C> {
    /// Client using the configured access token.
    pub fn new(config: &ClientConfig, connector: C) -> Self {
        Self::with_tokens(config, connector, config.access_token.clone())
    }

    /// Client reading its credential from `tokens` on every connect.
    pub fn with_tokens(
        config: &ClientConfig,
        connector: C,
        tokens: impl TokenSource + 'static,
    ) -> Self {
        let mut session = ConnectionManager::new(config.session(), connector, tokens);
        let (_, events) = session.subscribe_all();
        GameClient {
            session,
            events,
            view: ViewModel::new(config.username.clone()),
            controller: MoveController::new(MatchPolicy::default()),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.controller = MoveController::new(policy);
        self
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    pub fn controller(&self) -> &MoveController {
        &self.controller
    }

    pub fn session(&self) -> &ConnectionManager<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConnectionManager<C> {
        &mut self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Connect to `room`, replacing any current session. Selection and any
    /// pending promotion belong to the previous game and are dropped.
    pub fn join(&mut self, room: &str) -> Result<Vec<SessionEvent>, SessionError> {
        self.controller.reset();
        let result = self.session.connect(room);
        let events = self.drain();
        result.map(|()| events)
    }

    pub fn leave(&mut self) -> Vec<SessionEvent> {
        self.controller.reset();
        self.session.disconnect();
        self.drain()
    }

    /// Wait for the next socket or timer signal, fold the resulting events
    /// into the view, and return them.
    pub async fn step(&mut self) -> Vec<SessionEvent> {
        self.session.process_next().await;
        self.drain()
    }

    /// Handle everything already queued without waiting.
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        self.session.process_pending();
        self.drain()
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.view.apply_session_event(&event);
            match &event {
                SessionEvent::Open { room } if *room != self.session.config().lobby_room => {
                    // Catch up on anything missed while disconnected.
                    if let Err(e) = self.session.send(&ClientCommand::SyncRequest) {
                        warn!(error = %e, "sync request after open failed");
                    }
                }
                SessionEvent::Frame { .. } => self.controller.refresh(&self.view),
                _ => {}
            }
            out.push(event);
        }
        out
    }

    // -------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------

    /// Feed a board click. A submitted move is sent right away.
    pub fn click(&mut self, square: Square) -> Result<ClickOutcome, SessionError> {
        let outcome = self.controller.click(&self.view, square);
        self.dispatch(outcome)
    }

    pub fn choose_promotion(&mut self, piece: PieceType) -> Result<ClickOutcome, SessionError> {
        let outcome = self.controller.choose_promotion(&self.view, piece);
        self.dispatch(outcome)
    }

    pub fn cancel_promotion(&mut self) {
        self.controller.cancel_promotion();
    }

    fn dispatch(&mut self, outcome: ClickOutcome) -> Result<ClickOutcome, SessionError> {
        if let ClickOutcome::Submitted(cmd) = &outcome {
            let result = self.session.send(&cmd.command);
            self.drain();
            result?;
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------
    // Intents
    // -------------------------------------------------------------------

    pub fn resign(&mut self) -> Result<(), SessionError> {
        info!("resigning");
        self.command(ClientCommand::Resign)
    }

    pub fn offer_draw(&mut self) -> Result<(), SessionError> {
        self.command(ClientCommand::OfferDraw)
    }

    /// Answer the opponent's draw offer. The offer is cleared once the
    /// answer has gone out.
    pub fn respond_draw(&mut self, accept: bool) -> Result<(), SessionError> {
        self.command(ClientCommand::RespondDraw { accept })?;
        self.view.clear_draw_offer();
        Ok(())
    }

    pub fn request_sync(&mut self) -> Result<(), SessionError> {
        self.command(ClientCommand::SyncRequest)
    }

    pub fn chat(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        self.command(ClientCommand::Chat {
            message: message.into(),
        })
    }

    pub fn lobby_subscribe(&mut self) -> Result<(), SessionError> {
        self.command(ClientCommand::LobbySubscribe)
    }

    pub fn create_room(&mut self, name: &str, password: &str) -> Result<(), SessionError> {
        self.command(ClientCommand::CreateRoom {
            name: name.to_string(),
            password: password.to_string(),
        })
    }

    pub fn join_room(&mut self, name: &str, password: &str) -> Result<(), SessionError> {
        self.command(ClientCommand::JoinRoom {
            name: name.to_string(),
            password: password.to_string(),
        })
    }

    fn command(&mut self, command: ClientCommand) -> Result<(), SessionError> {
        let result = self.session.send(&command);
        self.drain();
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
