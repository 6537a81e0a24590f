//! Turns board clicks into at most one outbound move.
//!
//! First click selects a piece of the side to move, clicking it again
//! deselects, clicking another own piece reselects, anything else is a move
//! attempt checked against the server's legal-move list. A pawn reaching its
//! last rank parks as a pending promotion until a piece is chosen.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::engine::legal::{self, MatchPolicy, MoveRejection};
use crate::engine::types::{AttemptedMove, PieceType, Square};
use crate::game::view::ViewModel;
use crate::ws::messages::ClientCommand;

/// A move that passed local checks, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    pub attempted: AttemptedMove,
    /// Locally encoded notation the legal-move list accepted.
    pub notation: String,
    pub command: ClientCommand,
}

/// Result of one click or promotion choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Selected {
        square: Square,
        targets: BTreeSet<Square>,
    },
    Deselected,
    /// Nothing to do (empty square with no selection, game over, …).
    Ignored,
    Rejected(MoveRejection),
    PromotionRequired {
        from: Square,
        to: Square,
    },
    Submitted(MoveCommand),
}

#[derive(Debug, Clone, Default)]
pub struct MoveController {
    policy: MatchPolicy,
    selected: Option<Square>,
    pending_promotion: Option<AttemptedMove>,
}

impl MoveController {
    pub fn new(policy: MatchPolicy) -> Self {
        MoveController {
            policy,
            selected: None,
            pending_promotion: None,
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn selected(&self) -> Option<Square> {
        self.selected
    }

    pub fn pending_promotion(&self) -> Option<AttemptedMove> {
        self.pending_promotion
    }

    /// Destinations to highlight for the current selection.
    pub fn highlights(&self, view: &ViewModel) -> BTreeSet<Square> {
        match self.selected {
            Some(sq) => legal::destinations(view.board(), sq, view.legal_moves()),
            None => BTreeSet::new(),
        }
    }

    /// Forget any selection and pending promotion.
    pub fn reset(&mut self) {
        self.selected = None;
        self.pending_promotion = None;
    }

    /// Drop a selection the latest snapshot made meaningless.
    pub fn refresh(&mut self, view: &ViewModel) {
        if view.is_game_over() {
            self.reset();
            return;
        }
        if let Some(sq) = self.selected {
            let still_movable = view
                .board()
                .piece_at(sq)
                .is_some_and(|p| view.turn().is_none_or(|t| t == p.color));
            if !still_movable {
                self.selected = None;
            }
        }
    }

    pub fn click(&mut self, view: &ViewModel, square: Square) -> ClickOutcome {
        if view.is_game_over() {
            let attempted = self.selected.is_some_and(|from| from != square);
            self.reset();
            return if attempted {
                ClickOutcome::Rejected(MoveRejection::GameOver)
            } else {
                ClickOutcome::Ignored
            };
        }
        if self.pending_promotion.is_some() {
            return ClickOutcome::Rejected(MoveRejection::AwaitingPromotion);
        }

        let board = view.board();
        let clicked = board.piece_at(square);

        let Some(from) = self.selected else {
            let Some(piece) = clicked else {
                return ClickOutcome::Ignored;
            };
            if let Some(turn) = view.turn() {
                if piece.color != turn {
                    return ClickOutcome::Rejected(MoveRejection::NotYourTurn {
                        turn,
                        piece_color: piece.color,
                    });
                }
                if !view.is_local_turn() {
                    return ClickOutcome::Rejected(MoveRejection::OpponentToMove { turn });
                }
            }
            return self.select(view, square);
        };

        if from == square {
            self.selected = None;
            return ClickOutcome::Deselected;
        }

        let Some(mover) = board.piece_at(from) else {
            self.selected = None;
            return ClickOutcome::Rejected(MoveRejection::NoPiece(from));
        };
        if clicked.is_some_and(|p| p.color == mover.color) {
            return self.select(view, square);
        }

        self.selected = None;
        self.attempt(view, AttemptedMove::new(from, square))
    }

    /// Complete a pending promotion with `piece`.
    pub fn choose_promotion(&mut self, view: &ViewModel, piece: PieceType) -> ClickOutcome {
        let Some(pending) = self.pending_promotion else {
            return ClickOutcome::Ignored;
        };
        let mv = match pending.with_promotion(piece) {
            Ok(mv) => mv,
            Err(_) => return ClickOutcome::Rejected(MoveRejection::InvalidPromotion(piece)),
        };
        self.pending_promotion = None;
        if view.is_game_over() {
            return ClickOutcome::Rejected(MoveRejection::GameOver);
        }
        self.submit(view, mv)
    }

    pub fn cancel_promotion(&mut self) {
        self.pending_promotion = None;
    }

    fn select(&mut self, view: &ViewModel, square: Square) -> ClickOutcome {
        self.selected = Some(square);
        let targets = legal::destinations(view.board(), square, view.legal_moves());
        debug!(%square, targets = targets.len(), "selected");
        ClickOutcome::Selected { square, targets }
    }

    fn attempt(&mut self, view: &ViewModel, mv: AttemptedMove) -> ClickOutcome {
        if legal::is_promotion_candidate(view.board(), mv.from, mv.to) {
            // Check the square pair before asking for a piece.
            if let Err(rejection) = view.legal_moves().permits(view.board(), &mv, self.policy) {
                info!(%mv, %rejection, "move rejected locally");
                return ClickOutcome::Rejected(rejection);
            }
            self.pending_promotion = Some(mv);
            return ClickOutcome::PromotionRequired {
                from: mv.from,
                to: mv.to,
            };
        }
        self.submit(view, mv)
    }

    fn submit(&mut self, view: &ViewModel, mv: AttemptedMove) -> ClickOutcome {
        let notation = match view.legal_moves().permits(view.board(), &mv, self.policy) {
            Ok(notation) => notation,
            Err(rejection) => {
                info!(%mv, %rejection, "move rejected locally");
                return ClickOutcome::Rejected(rejection);
            }
        };
        match ClientCommand::from_move(&mv) {
            Ok(command) => {
                info!(%mv, %notation, "move submitted");
                ClickOutcome::Submitted(MoveCommand {
                    attempted: mv,
                    notation,
                    command,
                })
            }
            Err(_) => match mv.promotion {
                Some(piece) => ClickOutcome::Rejected(MoveRejection::InvalidPromotion(piece)),
                None => ClickOutcome::Rejected(MoveRejection::NoPiece(mv.from)),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
