//! Passive 8×8 board model.
//!
//! `Board` is only ever replaced wholesale from a server snapshot; the client
//! never applies moves to it. Cells on the wire are `null` or a color code
//! followed by a piece name, e.g. `"bKrol"` or `"cPionek"`.

use serde_json::Value;

use crate::engine::types::{ChessError, Color, Piece, PieceType, Square};

/// Wire names of the piece kinds, indexed by `PieceType::index()`.
const WIRE_NAMES: [&str; PieceType::COUNT] =
    ["Pionek", "Skoczek", "Goniec", "Wieza", "Hetman", "Krol"];

/// Ordered 8×8 grid of optional pieces, row 0 = rank 8.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<Piece>; 8]; 8],
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Board {
    /// A board with no pieces.
    pub fn empty() -> Self {
        Board::default()
    }

    /// The standard initial position.
    pub fn starting() -> Self {
        use PieceType::*;
        const BACK: [PieceType; 8] = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

        let mut board = Board::empty();
        for (col, kind) in BACK.iter().enumerate() {
            board.cells[0][col] = Some(Piece::new(*kind, Color::SecondMover));
            board.cells[1][col] = Some(Piece::new(Pawn, Color::SecondMover));
            board.cells[6][col] = Some(Piece::new(Pawn, Color::FirstMover));
            board.cells[7][col] = Some(Piece::new(*kind, Color::FirstMover));
        }
        board
    }

    /// Return a copy with `piece` placed on `sq`. Intended for building
    /// fixtures; live boards only come from the server.
    pub fn with_piece(mut self, sq: Square, piece: Piece) -> Self {
        self.cells[sq.row() as usize][sq.col() as usize] = Some(piece);
        self
    }

    /// Return a copy with `sq` emptied.
    pub fn without_piece(mut self, sq: Square) -> Self {
        self.cells[sq.row() as usize][sq.col() as usize] = None;
        self
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

impl Board {
    /// The piece on `sq`, if any.
    #[inline]
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.cells[sq.row() as usize][sq.col() as usize]
    }

    #[inline]
    pub fn is_empty_at(&self, sq: Square) -> bool {
        self.piece_at(sq).is_none()
    }

    /// Every occupied square with its piece, in row-major order.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(|sq| self.piece_at(sq).map(|p| (sq, p)))
    }

    /// Square of the given side's king.
    pub fn find_king(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.kind == PieceType::King && p.color == color)
            .map(|(sq, _)| sq)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Decode a single wire cell such as `"bHetman"`.
pub fn decode_cell(raw: &str) -> Result<Piece, ChessError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let mut chars = cleaned.chars();
    let color = chars
        .next()
        .and_then(|c| Color::from_wire(&c.to_string()))
        .ok_or_else(|| ChessError::InvalidPiece(raw.to_string()))?;
    let name = chars.as_str();
    let kind = PieceType::ALL
        .into_iter()
        .find(|pt| WIRE_NAMES[pt.index()].eq_ignore_ascii_case(name))
        .ok_or_else(|| ChessError::InvalidPiece(raw.to_string()))?;
    Ok(Piece::new(kind, color))
}

/// Encode a piece the way the server writes it.
pub fn encode_cell(piece: Piece) -> String {
    format!("{}{}", piece.color.wire_code(), WIRE_NAMES[piece.kind.index()])
}

impl Board {
    /// Decode a board from its JSON wire form (array of 8 rows of 8 cells).
    pub fn from_json(value: &Value) -> Result<Self, ChessError> {
        let rows = value
            .as_array()
            .ok_or_else(|| ChessError::InvalidBoard("board is not an array".into()))?;
        if rows.len() != 8 {
            return Err(ChessError::InvalidBoard(format!(
                "expected 8 rows, got {}",
                rows.len()
            )));
        }

        let mut board = Board::empty();
        for (r, row) in rows.iter().enumerate() {
            let cells = row
                .as_array()
                .filter(|cells| cells.len() == 8)
                .ok_or_else(|| ChessError::InvalidBoard(format!("row {r} is not 8 cells")))?;
            for (c, cell) in cells.iter().enumerate() {
                board.cells[r][c] = match cell {
                    Value::Null => None,
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(decode_cell(s)?),
                    other => {
                        return Err(ChessError::InvalidBoard(format!(
                            "unexpected cell at {r},{c}: {other}"
                        )));
                    }
                };
            }
        }
        Ok(board)
    }

    /// Encode the board in its JSON wire form.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.cells
                .iter()
                .map(|row| {
                    Value::Array(
                        row.iter()
                            .map(|cell| match cell {
                                Some(p) => Value::String(encode_cell(*p)),
                                None => Value::Null,
                            })
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Text diagram with rank/file labels. First-mover pieces are uppercase.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(200);
        for row in 0..8u8 {
            out.push((b'8' - row) as char);
            out.push(' ');
            for col in 0..8u8 {
                let ch = Square::new(row, col)
                    .and_then(|sq| self.piece_at(sq))
                    .map_or('.', diagram_char);
                out.push(ch);
                if col < 7 {
                    out.push(' ');
                }
            }
            out.push('\n');
        }
        out.push_str("  a b c d e f g h\n");
        out
    }
}

fn diagram_char(piece: Piece) -> char {
    let c = match piece.kind {
        PieceType::Pawn => 'p',
        PieceType::Knight => 'n',
        PieceType::Bishop => 'b',
        PieceType::Rook => 'r',
        PieceType::Queen => 'q',
        PieceType::King => 'k',
    };
    match piece.color {
        Color::FirstMover => c.to_ascii_uppercase(),
        Color::SecondMover => c,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
