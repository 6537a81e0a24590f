//! Game-state projector.
//!
//! Folds normalised server events and session lifecycle events into one
//! [`ViewModel`]. A frame only ever overwrites the fields it carries; board,
//! turn and history survive partial frames untouched.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::board::Board;
use crate::engine::legal::{self, LegalMoveSet};
use crate::engine::types::{Color, Square};
use crate::ws::events::SessionEvent;
use crate::ws::messages::{ServerEvent, Snapshot, Winner};

/// Connection state as the UI shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
    /// No credential; the user must log in.
    AuthRequired,
    /// The server rejected the credential; the user must log in again.
    AuthFailed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::AuthRequired => write!(f, "login required"),
            ConnectionStatus::AuthFailed => write!(f, "login rejected"),
        }
    }
}

/// A chat line as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub sender: Option<String>,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

/// Remaining time per side, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clocks {
    pub first_mover: Option<f64>,
    pub second_mover: Option<f64>,
}

/// Everything the UI renders, kept consistent with the server's pushes.
#[derive(Debug, Clone)]
pub struct ViewModel {
    board: Board,
    turn: Option<Color>,
    check: bool,
    checkmate: bool,
    stalemate: bool,
    game_over: bool,
    reason: Option<String>,
    winner: Option<Winner>,
    history: Vec<String>,
    legal_moves: LegalMoveSet,
    players: [Option<String>; 2],
    clocks: Clocks,
    room: Option<String>,
    connection: ConnectionStatus,
    local_user: Option<String>,
    last_move: Option<String>,
    draw_offer: Option<String>,
    chat: Vec<ChatLine>,
    notices: Vec<String>,
    last_error: Option<String>,
}

impl ViewModel {
    /// Empty view for a session. `local_user` is used to recognise our own
    /// draw offers and our seat in the player list.
    pub fn new(local_user: Option<String>) -> Self {
        ViewModel {
            board: Board::empty(),
            turn: None,
            check: false,
            checkmate: false,
            stalemate: false,
            game_over: false,
            reason: None,
            winner: None,
            history: Vec::new(),
            legal_moves: LegalMoveSet::default(),
            players: [None, None],
            clocks: Clocks::default(),
            room: None,
            connection: ConnectionStatus::Disconnected,
            local_user,
            last_move: None,
            draw_offer: None,
            chat: Vec::new(),
            notices: Vec::new(),
            last_error: None,
        }
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Option<Color> {
        self.turn
    }

    pub fn check(&self) -> bool {
        self.check
    }

    pub fn checkmate(&self) -> bool {
        self.checkmate
    }

    pub fn stalemate(&self) -> bool {
        self.stalemate
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn legal_moves(&self) -> &LegalMoveSet {
        &self.legal_moves
    }

    /// Player name for a side, if seated.
    pub fn player(&self, color: Color) -> Option<&str> {
        self.players[color.index()].as_deref()
    }

    pub fn clocks(&self) -> Clocks {
        self.clocks
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn last_move(&self) -> Option<&str> {
        self.last_move.as_deref()
    }

    /// Sender of a draw offer awaiting our answer.
    pub fn pending_draw_offer(&self) -> Option<&str> {
        self.draw_offer.as_deref()
    }

    pub fn chat(&self) -> &[ChatLine] {
        &self.chat
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Our side, when our username appears in the player list.
    pub fn local_color(&self) -> Option<Color> {
        let me = self.local_user.as_deref()?;
        [Color::FirstMover, Color::SecondMover]
            .into_iter()
            .find(|c| self.players[c.index()].as_deref() == Some(me))
    }

    /// Whether the local user may move now. Unknown seats do not block.
    pub fn is_local_turn(&self) -> bool {
        match (self.turn, self.local_color()) {
            (Some(turn), Some(me)) => turn == me,
            _ => true,
        }
    }

    /// King square to highlight for check.
    pub fn check_square(&self) -> Option<Square> {
        legal::check_highlight(&self.board, self.check, self.turn)
    }

    // -------------------------------------------------------------------
    // Projection
    // -------------------------------------------------------------------

    /// Fold a session event in. Frames are normalised and applied; lifecycle
    /// events update the connection status.
    pub fn apply_session_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Open { room } => {
                self.connection = ConnectionStatus::Connected;
                self.room = Some(room.clone());
            }
            SessionEvent::Close(info) => {
                if !matches!(
                    self.connection,
                    ConnectionStatus::AuthFailed | ConnectionStatus::AuthRequired
                ) || info.by_client
                {
                    self.connection = ConnectionStatus::Disconnected;
                }
            }
            SessionEvent::Reconnecting { .. } => self.connection = ConnectionStatus::Reconnecting,
            SessionEvent::AuthRequired => self.connection = ConnectionStatus::AuthRequired,
            SessionEvent::AuthFailed { .. } => self.connection = ConnectionStatus::AuthFailed,
            SessionEvent::Error(error) => self.last_error = Some(error.clone()),
            SessionEvent::Frame { payload, .. } => {
                if let Some(server_event) = ServerEvent::from_frame(payload) {
                    self.apply(&server_event);
                }
            }
            SessionEvent::SendFailed { kind } => {
                self.last_error = Some(format!("could not send {kind}: not connected"));
            }
            SessionEvent::Message(_) | SessionEvent::Malformed { .. } => {}
        }
    }

    /// Fold one normalised server event in.
    pub fn apply(&mut self, event: &ServerEvent) {
        debug!(kind = event.kind(), "projecting");
        match event {
            ServerEvent::Connected {
                room,
                players,
                snapshot,
            } => {
                if room.is_some() {
                    self.room = room.clone();
                }
                if !players.is_empty() {
                    self.players = [players.first().cloned(), players.get(1).cloned()];
                }
                self.apply_state_push(snapshot);
            }
            ServerEvent::Sync(snapshot) => self.apply_state_push(snapshot),
            ServerEvent::Move { notation, snapshot } => {
                if notation.is_some() {
                    self.last_move = notation.clone();
                }
                self.apply_state_push(snapshot);
            }
            ServerEvent::LegalMoves(set) => self.legal_moves = set.clone(),
            ServerEvent::GameOver(snapshot) => {
                self.apply_snapshot(snapshot);
                self.game_over = true;
                self.settle_outcome();
            }
            ServerEvent::DrawOffer { sender } => {
                let from_me = sender.is_some() && sender.as_deref() == self.local_user.as_deref();
                if from_me {
                    self.notices.push("draw offer sent".to_string());
                } else if !self.game_over {
                    self.draw_offer = Some(sender.clone().unwrap_or_else(|| "opponent".into()));
                }
            }
            ServerEvent::DrawRejected { sender } => {
                self.draw_offer = None;
                self.notices.push(format!(
                    "draw declined by {}",
                    sender.as_deref().unwrap_or("opponent")
                ));
            }
            ServerEvent::PlayerJoined { user } => {
                self.notices.push(format!(
                    "{} joined",
                    user.as_deref().unwrap_or("a player")
                ));
            }
            ServerEvent::Chat { sender, message } => self.chat.push(ChatLine {
                sender: sender.clone(),
                message: message.clone(),
                received_at: Utc::now(),
            }),
            ServerEvent::Error { detail } => self.last_error = Some(detail.clone()),
            ServerEvent::Other { .. } => {}
        }
    }

    /// The local answer to a draw offer has been sent.
    pub fn clear_draw_offer(&mut self) {
        self.draw_offer = None;
    }

    /// A state push replaces the legal-move list wholesale, even when the
    /// frame carries none.
    fn apply_state_push(&mut self, snapshot: &Snapshot) {
        self.legal_moves = snapshot.legal_moves.clone().unwrap_or_default();
        self.apply_snapshot(snapshot);
        self.settle_outcome();
    }

    fn apply_snapshot(&mut self, s: &Snapshot) {
        if let Some(board) = &s.board {
            self.board = board.clone();
        }
        if let Some(history) = &s.history {
            self.history = history.clone();
        }
        match (s.turn, &s.history) {
            (Some(turn), _) => self.turn = Some(turn),
            // Post-move snapshots omit the turn; history parity gives it.
            (None, Some(history)) => {
                self.turn = Some(if history.len() % 2 == 0 {
                    Color::FirstMover
                } else {
                    Color::SecondMover
                });
            }
            (None, None) => {}
        }
        if let Some(legal_moves) = &s.legal_moves {
            self.legal_moves = legal_moves.clone();
        }
        if let Some(check) = s.check {
            self.check = check;
        }
        if let Some(checkmate) = s.checkmate {
            self.checkmate = checkmate;
        }
        if let Some(stalemate) = s.stalemate {
            self.stalemate = stalemate;
        }
        if let Some(game_over) = s.game_over {
            self.game_over = game_over;
        }
        if let Some(reason) = &s.reason {
            self.reason = Some(reason.clone());
        }
        if s.winner.is_some() {
            self.winner = s.winner;
        }
        if let Some(t) = s.white_time {
            self.clocks.first_mover = Some(t);
        }
        if let Some(t) = s.black_time {
            self.clocks.second_mover = Some(t);
        }
    }

    /// Derive the outcome from checkmate/stalemate flags where the server
    /// did not state it, and close out a finished game.
    fn settle_outcome(&mut self) {
        if self.checkmate {
            self.game_over = true;
            if self.reason.is_none() {
                self.reason = Some("checkmate".into());
            }
            if self.winner.is_none() {
                self.winner = self.turn.map(|mated| Winner::Side(!mated));
            }
        } else if self.stalemate {
            self.game_over = true;
            if self.reason.is_none() {
                self.reason = Some("stalemate".into());
            }
            if self.winner.is_none() {
                self.winner = Some(Winner::Draw);
            }
        }

        if self.game_over {
            self.draw_offer = None;
            self.legal_moves = LegalMoveSet::default();
        }
    }

    /// One-line summary of the result, once the game is over.
    pub fn outcome_text(&self) -> Option<String> {
        if !self.game_over {
            return None;
        }
        let reason = self.reason.as_deref().unwrap_or("game over");
        Some(match self.winner {
            Some(Winner::Side(color)) => {
                let name = self.player(color).map(str::to_string).unwrap_or_else(|| color.to_string());
                format!("{name} wins ({reason})")
            }
            Some(Winner::Draw) => format!("draw ({reason})"),
            None => reason.to_string(),
        })
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        ViewModel::new(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
