//! Square names and move notation in the server's dialect.
//!
//! Notation examples: `e4`, `Sf3`, `Gxe5`, `dxe6`, `O-O`, `O-O-O`.
//! Piece letters come from [`ALPHABET`], the one table that ties piece kinds
//! to the server's letters.

use crate::engine::board::Board;
use crate::engine::types::{ChessError, Color, PieceType, Square};

// =========================================================================
// Alphabet
// =========================================================================

/// Notation letter per piece kind, indexed by `PieceType::index()`.
/// Pawns have no letter. Must stay bijective with the server's alphabet.
pub const ALPHABET: [(PieceType, Option<char>); PieceType::COUNT] = [
    (PieceType::Pawn, None),
    (PieceType::Knight, Some('S')),
    (PieceType::Bishop, Some('G')),
    (PieceType::Rook, Some('W')),
    (PieceType::Queen, Some('H')),
    (PieceType::King, Some('K')),
];

/// Letter for a piece kind (`None` for pawns).
#[inline]
pub fn piece_letter(kind: PieceType) -> Option<char> {
    ALPHABET[kind.index()].1
}

/// Piece kind for a notation letter. Letters are uppercase; lowercase
/// letters are files, not pieces.
pub fn piece_from_letter(letter: char) -> Option<PieceType> {
    ALPHABET
        .iter()
        .find(|(_, l)| *l == Some(letter))
        .map(|(kind, _)| *kind)
}

/// Letter sent in the `promo` field of a move frame.
pub fn promotion_letter(kind: PieceType) -> Result<char, ChessError> {
    if !kind.is_promotion_target() {
        return Err(ChessError::InvalidPromotion(kind.to_string()));
    }
    piece_letter(kind).ok_or_else(|| ChessError::InvalidPromotion(kind.to_string()))
}

// =========================================================================
// Square names
// =========================================================================

/// `(row, col)` → `"e4"`. `None` when off-board.
pub fn square_to_name(row: u8, col: u8) -> Option<String> {
    Square::new(row, col).map(|sq| sq.to_string())
}

/// `"e4"` → `(row, col)`. `None` for anything but a file letter and a rank
/// digit.
pub fn name_to_square(name: &str) -> Option<Square> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = bytes[0].wrapping_sub(b'a');
    let rank = bytes[1].wrapping_sub(b'1');
    if col < 8 && rank < 8 {
        Square::new(7 - rank, col)
    } else {
        None
    }
}

// =========================================================================
// Castling
// =========================================================================

/// The two castling directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Castle {
    /// Towards the h-file rook.
    Short,
    /// Towards the a-file rook.
    Long,
}

impl Castle {
    pub fn token(self) -> &'static str {
        match self {
            Castle::Short => "O-O",
            Castle::Long => "O-O-O",
        }
    }

    /// Recognise `O-O`, `O-O-O` and their digit-zero spellings, any case,
    /// ignoring check suffixes.
    pub fn parse(token: &str) -> Option<Self> {
        let t = strip_suffixes(token.trim()).to_ascii_uppercase().replace('0', "O");
        match t.as_str() {
            "O-O" => Some(Castle::Short),
            "O-O-O" => Some(Castle::Long),
            _ => None,
        }
    }

    /// Fixed square the king lands on.
    pub fn king_destination(self, color: Color) -> Square {
        let col = match self {
            Castle::Short => 6,
            Castle::Long => 2,
        };
        Square::at(color.home_row(), col)
    }
}

// =========================================================================
// Encoding
// =========================================================================

/// Notation token for moving the piece on `from` to `to`, in the shape the
/// server uses for its legal-move list.
///
/// Does not check legality. Fails only when `from` is empty.
pub fn encode_move(board: &Board, from: Square, to: Square) -> Result<String, ChessError> {
    let piece = board.piece_at(from).ok_or_else(|| ChessError::InvalidMove {
        from: from.to_string(),
        to: to.to_string(),
        reason: "no piece on source square".into(),
    })?;

    let dr = to.row() as i16 - from.row() as i16;
    let dc = to.col() as i16 - from.col() as i16;

    if piece.kind == PieceType::King && dr == 0 && dc.abs() == 2 {
        let castle = if dc > 0 { Castle::Short } else { Castle::Long };
        return Ok(castle.token().to_string());
    }

    let capture = match board.piece_at(to) {
        Some(_) => true,
        None => piece.kind == PieceType::Pawn && is_en_passant(board, from, to),
    };

    let mut token = String::with_capacity(6);
    match piece_letter(piece.kind) {
        Some(letter) => {
            token.push(letter);
            if capture {
                token.push('x');
            }
        }
        None => {
            if capture {
                token.push((b'a' + from.col()) as char);
                token.push('x');
            }
        }
    }
    token.push_str(&to.to_string());
    Ok(token)
}

/// A pawn stepping diagonally onto an empty square beside an enemy pawn on
/// its own row.
pub fn is_en_passant(board: &Board, from: Square, to: Square) -> bool {
    let Some(mover) = board.piece_at(from) else {
        return false;
    };
    if mover.kind != PieceType::Pawn || !board.is_empty_at(to) {
        return false;
    }
    let dr = to.row() as i16 - from.row() as i16;
    let dc = to.col() as i16 - from.col() as i16;
    if dr != mover.color.pawn_direction() as i16 || dc.abs() != 1 {
        return false;
    }
    Square::new(from.row(), to.col())
        .and_then(|sq| board.piece_at(sq))
        .is_some_and(|victim| victim.kind == PieceType::Pawn && victim.color != mover.color)
}

// =========================================================================
// Parsing
// =========================================================================

/// Structural reading of a notation token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Castle(Castle),
    Move {
        piece: PieceType,
        to: Square,
        capture: bool,
        /// Source column named by a disambiguator or a pawn-capture file.
        from_col: Option<u8>,
        /// Source row named by a rank disambiguator.
        from_row: Option<u8>,
    },
}

impl Token {
    /// Piece kind the token moves.
    pub fn piece(self) -> PieceType {
        match self {
            Token::Castle(_) => PieceType::King,
            Token::Move { piece, .. } => piece,
        }
    }

    /// Whether the token's disambiguation (if any) is consistent with a
    /// move starting on `from`.
    pub fn admits_source(self, from: Square) -> bool {
        match self {
            Token::Castle(_) => true,
            Token::Move {
                from_col, from_row, ..
            } => {
                from_col.is_none_or(|c| c == from.col()) && from_row.is_none_or(|r| r == from.row())
            }
        }
    }
}

/// Parse a token loosely: leading piece letter (absent for pawns), the last
/// square name in the string is the destination, anything between the two is
/// read as disambiguation, promotion/check suffixes are skipped.
pub fn parse_token(token: &str) -> Option<Token> {
    if let Some(castle) = Castle::parse(token) {
        return Some(Token::Castle(castle));
    }

    let t = strip_suffixes(token.trim());
    let chars: Vec<char> = t.chars().collect();
    let (piece, start) = match chars.first().and_then(|c| piece_from_letter(*c)) {
        Some(kind) => (kind, 1),
        None => (PieceType::Pawn, 0),
    };

    let dest_at = (start..chars.len().saturating_sub(1))
        .rev()
        .find(|&i| name_to_square(&chars[i..i + 2].iter().collect::<String>()).is_some())?;
    let to = name_to_square(&chars[dest_at..dest_at + 2].iter().collect::<String>())?;

    let mut capture = false;
    let mut from_col = None;
    let mut from_row = None;
    for c in &chars[start..dest_at] {
        match c {
            'x' | 'X' | ':' => capture = true,
            'a'..='h' => from_col = Some(*c as u8 - b'a'),
            '1'..='8' => from_row = Some(7 - (*c as u8 - b'1')),
            _ => {}
        }
    }

    Some(Token::Move {
        piece,
        to,
        capture,
        from_col,
        from_row,
    })
}

fn strip_suffixes(token: &str) -> &str {
    token.trim_end_matches(['+', '#', '!', '?'])
}

// =========================================================================
// Tests
// =========================================================================
