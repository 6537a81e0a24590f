use std::fmt;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The two sides of a game, named by move order rather than by colour so the
/// protocol stays neutral about what the server calls them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    FirstMover,
    SecondMover,
}

impl Color {
    /// Index for array lookups: FirstMover=0, SecondMover=1.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Single-letter code used on the wire (`b` / `c`).
    pub fn wire_code(self) -> char {
        match self {
            Color::FirstMover => 'b',
            Color::SecondMover => 'c',
        }
    }

    /// Parse a wire color code. Accepts the short codes and the long English
    /// names some server builds emit.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "white" | "first" => Some(Color::FirstMover),
            "c" | "black" | "second" => Some(Color::SecondMover),
            _ => None,
        }
    }

    /// Row holding this side's king and rooks at the start of the game.
    #[inline]
    pub const fn home_row(self) -> u8 {
        match self {
            Color::FirstMover => 7,
            Color::SecondMover => 0,
        }
    }

    /// Row this side's pawns start on (eligible for the double step).
    #[inline]
    pub const fn pawn_row(self) -> u8 {
        match self {
            Color::FirstMover => 6,
            Color::SecondMover => 1,
        }
    }

    /// Row a pawn of this side promotes on.
    #[inline]
    pub const fn promotion_row(self) -> u8 {
        match self {
            Color::FirstMover => 0,
            Color::SecondMover => 7,
        }
    }

    /// Row delta of a single pawn step.
    #[inline]
    pub const fn pawn_direction(self) -> i8 {
        match self {
            Color::FirstMover => -1,
            Color::SecondMover => 1,
        }
    }
}

impl std::ops::Not for Color {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Color::FirstMover => Color::SecondMover,
            Color::SecondMover => Color::FirstMover,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::FirstMover => write!(f, "first-mover"),
            Color::SecondMover => write!(f, "second-mover"),
        }
    }
}

// ---------------------------------------------------------------------------
// PieceType / Piece
// ---------------------------------------------------------------------------

/// The six piece kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceType {
    /// All piece types in order.
    pub const ALL: [PieceType; 6] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];

    /// Pieces a pawn may promote to.
    pub const PROMOTIONS: [PieceType; 4] = [
        PieceType::Queen,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
    ];

    /// Number of piece types.
    pub const COUNT: usize = 6;

    /// Index for array lookups: Pawn=0 .. King=5.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether a pawn may promote to this piece.
    pub fn is_promotion_target(self) -> bool {
        Self::PROMOTIONS.contains(&self)
    }
}

impl fmt::Display for PieceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceType::Pawn => write!(f, "pawn"),
            PieceType::Knight => write!(f, "knight"),
            PieceType::Bishop => write!(f, "bishop"),
            PieceType::Rook => write!(f, "rook"),
            PieceType::Queen => write!(f, "queen"),
            PieceType::King => write!(f, "king"),
        }
    }
}

/// A piece is fully described by its kind and side; it has no identity of its
/// own beyond the board cell it sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceType,
    pub color: Color,
}

impl Piece {
    pub const fn new(kind: PieceType, color: Color) -> Self {
        Piece { kind, color }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.color, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Square
// ---------------------------------------------------------------------------

/// A board cell as (row, col). Row 0 is rank 8, col 0 is file `a`.
///
/// Always within `[0, 8) × [0, 8)`; the only constructors check the bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    row: u8,
    col: u8,
}

impl Square {
    pub const SIZE: u8 = 8;

    /// Build a square, returning `None` when either coordinate is off-board.
    #[inline]
    pub fn new(row: u8, col: u8) -> Option<Self> {
        (row < Self::SIZE && col < Self::SIZE).then_some(Square { row, col })
    }

    /// Build a square from coordinates already known to be on the board.
    #[inline]
    pub(crate) const fn at(row: u8, col: u8) -> Self {
        debug_assert!(row < Self::SIZE && col < Self::SIZE);
        Square { row, col }
    }

    /// Build a square from signed coordinates (handy for offset arithmetic).
    #[inline]
    pub fn from_signed(row: i16, col: i16) -> Option<Self> {
        if (0..8).contains(&row) && (0..8).contains(&col) {
            Some(Square {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    #[inline]
    pub fn row(self) -> u8 {
        self.row
    }

    #[inline]
    pub fn col(self) -> u8 {
        self.col
    }

    /// Square displaced by `(dr, dc)`, or `None` if it falls off the board.
    #[inline]
    pub fn offset(self, dr: i8, dc: i8) -> Option<Self> {
        Self::from_signed(self.row as i16 + dr as i16, self.col as i16 + dc as i16)
    }

    /// Iterate every square in row-major order (a8, b8, … h1).
    pub fn all() -> impl Iterator<Item = Square> {
        (0..Self::SIZE).flat_map(|row| (0..Self::SIZE).map(move |col| Square::at(row, col)))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.col) as char;
        let rank = (b'8' - self.row) as char;
        write!(f, "{file}{rank}")
    }
}

// ---------------------------------------------------------------------------
// AttemptedMove
// ---------------------------------------------------------------------------

/// A move the local user is trying to make. Built from a gesture, sent at
/// most once, then dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptedMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceType>,
}

impl AttemptedMove {
    pub fn new(from: Square, to: Square) -> Self {
        AttemptedMove {
            from,
            to,
            promotion: None,
        }
    }

    /// Attach a promotion choice, rejecting pawns and kings.
    pub fn with_promotion(self, piece: PieceType) -> Result<Self, ChessError> {
        if !piece.is_promotion_target() {
            return Err(ChessError::InvalidPromotion(piece.to_string()));
        }
        Ok(AttemptedMove {
            promotion: Some(piece),
            ..self
        })
    }
}

impl fmt::Display for AttemptedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(promo) = self.promotion {
            write!(f, "={promo}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChessError
// ---------------------------------------------------------------------------

/// Errors raised while decoding board data or building moves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChessError {
    #[error("invalid piece code: {0}")]
    InvalidPiece(String),

    #[error("invalid board: {0}")]
    InvalidBoard(String),

    #[error("invalid promotion piece: {0}")]
    InvalidPromotion(String),

    #[error("invalid move: {from} -> {to}: {reason}")]
    InvalidMove {
        from: String,
        to: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
