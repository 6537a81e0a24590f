//! Reconciliation of local gestures against the server's legal-move list.
//!
//! The server is the only authority on legality. This module answers two
//! UI questions from its list: "may this move be sent?" and "which squares
//! should light up for the selected piece?". Piece geometry is checked so
//! highlights stay on plausible squares, but check, pins and castling rights
//! are left entirely to the server.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::engine::board::Board;
use crate::engine::san::{self, Castle, Token};
use crate::engine::types::{AttemptedMove, Color, PieceType, Square};

// ---------------------------------------------------------------------------
// MatchPolicy
// ---------------------------------------------------------------------------

/// How a locally encoded token is compared with the server's entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Case-insensitive subsequence match only. Absorbs capture-marker and
    /// disambiguation differences, but can accept a token the server never
    /// listed (`e4` is a subsequence of `Se4` and of `dxe4`).
    Loose,
    /// Subsequence match, and both tokens must parse to the same piece kind,
    /// destination (or castle side), with any server disambiguation agreeing
    /// with the actual source square.
    #[default]
    Guarded,
}

// ---------------------------------------------------------------------------
// MoveRejection
// ---------------------------------------------------------------------------

/// Why a gesture was not turned into an outbound move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("no piece on {0}")]
    NoPiece(Square),

    #[error("it is {turn}'s turn, not {piece_color}'s")]
    NotYourTurn { turn: Color, piece_color: Color },

    #[error("it is {turn}'s turn and that seat belongs to the opponent")]
    OpponentToMove { turn: Color },

    #[error("{notation} is not in the legal-move list")]
    NotInLegalSet { notation: String },

    #[error("a promotion piece must be chosen first")]
    AwaitingPromotion,

    #[error("{0} is not a valid promotion piece")]
    InvalidPromotion(PieceType),

    #[error("the game is over")]
    GameOver,
}

// ---------------------------------------------------------------------------
// LegalMoveSet
// ---------------------------------------------------------------------------

/// The server's legal-move tokens for the current turn. Replaced wholesale on
/// every push; order is irrelevant and comparisons ignore case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegalMoveSet {
    entries: Vec<String>,
}

impl LegalMoveSet {
    pub fn new<I, S>(moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LegalMoveSet {
            entries: moves
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.trim().is_empty())
                .collect(),
        }
    }

    /// Read a JSON array of tokens. Non-string entries are skipped; a value
    /// that is not an array yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        Some(LegalMoveSet::new(
            items.iter().filter_map(|v| v.as_str()).map(str::to_string),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Exact (case-insensitive) membership.
    pub fn contains(&self, token: &str) -> bool {
        let needle = normalize(token);
        self.entries.iter().any(|e| normalize(e) == needle)
    }

    /// First server entry matching `candidate` under `policy`.
    pub fn find_match(&self, candidate: &str, policy: MatchPolicy) -> Option<&str> {
        self.find_match_from(candidate, None, policy)
    }

    fn find_match_from(
        &self,
        candidate: &str,
        from: Option<Square>,
        policy: MatchPolicy,
    ) -> Option<&str> {
        let variants = variants(candidate);
        let wanted = san::parse_token(candidate);

        self.iter().find(|entry| {
            if !variants.iter().any(|v| is_subsequence(v, entry)) {
                return false;
            }
            match policy {
                MatchPolicy::Loose => true,
                MatchPolicy::Guarded => {
                    let (Some(wanted), Some(offered)) = (wanted, san::parse_token(entry)) else {
                        return false;
                    };
                    same_move(wanted, offered) && from.is_none_or(|sq| offered.admits_source(sq))
                }
            }
        })
    }

    /// Decide whether `mv` may be sent. Returns the locally encoded token on
    /// success.
    ///
    /// Promotion is not checked here: a pawn reaching the last rank is listed
    /// by the server under its plain destination, and the piece choice rides
    /// in the move frame's `promo` field.
    pub fn permits(
        &self,
        board: &Board,
        mv: &AttemptedMove,
        policy: MatchPolicy,
    ) -> Result<String, MoveRejection> {
        let notation =
            san::encode_move(board, mv.from, mv.to).map_err(|_| MoveRejection::NoPiece(mv.from))?;
        match self.find_match_from(&notation, Some(mv.from), policy) {
            Some(_) => Ok(notation),
            None => Err(MoveRejection::NotInLegalSet { notation }),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for LegalMoveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        LegalMoveSet::new(iter)
    }
}

fn normalize(token: &str) -> String {
    token.trim().to_lowercase().replace('0', "o")
}

/// The candidate itself plus its capture-marker-free spelling.
fn variants(candidate: &str) -> Vec<String> {
    let base = normalize(candidate);
    let bare = base.replace('x', "");
    if bare != base && !bare.is_empty() {
        vec![base, bare]
    } else {
        vec![base]
    }
}

fn same_move(a: Token, b: Token) -> bool {
    match (a, b) {
        (Token::Castle(x), Token::Castle(y)) => x == y,
        (
            Token::Move {
                piece: pa, to: ta, ..
            },
            Token::Move {
                piece: pb, to: tb, ..
            },
        ) => pa == pb && ta == tb,
        _ => false,
    }
}

/// Whether every character of `needle` appears in `haystack` in order,
/// ignoring case and treating `0` as `O`.
pub fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let hay = normalize(haystack);
    let mut hay = hay.chars();
    normalize(needle).chars().all(|n| hay.any(|h| h == n))
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Whether every square strictly between `from` and `to` is empty. Only
/// meaningful for squares on a shared rank, file or diagonal.
pub fn path_clear(board: &Board, from: Square, to: Square) -> bool {
    let dr = (to.row() as i8 - from.row() as i8).signum();
    let dc = (to.col() as i8 - from.col() as i8).signum();
    let mut cur = from.offset(dr, dc);
    while let Some(sq) = cur {
        if sq == to {
            return true;
        }
        if !board.is_empty_at(sq) {
            return false;
        }
        cur = sq.offset(dr, dc);
    }
    false
}

/// Whether the piece on `from` could geometrically move to `to`. `castle`
/// names the castle token under consideration, which is the only way a king
/// may travel two files.
pub fn can_reach(board: &Board, from: Square, to: Square, castle: Option<Castle>) -> bool {
    let Some(piece) = board.piece_at(from) else {
        return false;
    };
    if from == to {
        return false;
    }
    if board.piece_at(to).is_some_and(|p| p.color == piece.color) {
        return false;
    }

    let dr = to.row() as i8 - from.row() as i8;
    let dc = to.col() as i8 - from.col() as i8;
    let (adr, adc) = (dr.abs(), dc.abs());

    match piece.kind {
        PieceType::Knight => (adr == 1 && adc == 2) || (adr == 2 && adc == 1),
        PieceType::King => match castle {
            Some(c) => to == c.king_destination(piece.color),
            None => adr.max(adc) == 1,
        },
        PieceType::Rook => (dr == 0 || dc == 0) && path_clear(board, from, to),
        PieceType::Bishop => adr == adc && path_clear(board, from, to),
        PieceType::Queen => (adr == adc || dr == 0 || dc == 0) && path_clear(board, from, to),
        PieceType::Pawn => {
            let dir = piece.color.pawn_direction();
            if dc == 0 && dr == dir {
                board.is_empty_at(to)
            } else if dc == 0 && dr == 2 * dir && from.row() == piece.color.pawn_row() {
                from.offset(dir, 0).is_some_and(|mid| board.is_empty_at(mid)) && board.is_empty_at(to)
            } else if adc == 1 && dr == dir {
                board.piece_at(to).is_some_and(|p| p.color != piece.color)
                    || san::is_en_passant(board, from, to)
            } else {
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Highlights
// ---------------------------------------------------------------------------

/// Squares to highlight for the piece on `from`: destinations of server
/// tokens moving the same piece kind that the piece can geometrically reach.
pub fn destinations(board: &Board, from: Square, legal: &LegalMoveSet) -> BTreeSet<Square> {
    let mut out = BTreeSet::new();
    let Some(piece) = board.piece_at(from) else {
        return out;
    };

    for entry in legal.iter() {
        let Some(token) = san::parse_token(entry) else {
            continue;
        };
        if token.piece() != piece.kind || !token.admits_source(from) {
            continue;
        }
        let (to, castle) = match token {
            Token::Castle(c) => (c.king_destination(piece.color), Some(c)),
            Token::Move { to, .. } => (to, None),
        };
        if can_reach(board, from, to, castle) {
            out.insert(to);
        }
    }
    out
}

/// A pawn move landing on its side's last row. The caller must obtain a
/// promotion piece before sending; no default is chosen here.
pub fn is_promotion_candidate(board: &Board, from: Square, to: Square) -> bool {
    board
        .piece_at(from)
        .is_some_and(|p| p.kind == PieceType::Pawn && to.row() == p.color.promotion_row())
}

/// King square to flag when the side to move is in check. With no known
/// turn, the first king found is used.
pub fn check_highlight(board: &Board, check: bool, turn: Option<Color>) -> Option<Square> {
    if !check {
        return None;
    }
    match turn {
        Some(color) => board.find_king(color),
        None => board
            .pieces()
            .find(|(_, p)| p.kind == PieceType::King)
            .map(|(sq, _)| sq),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
