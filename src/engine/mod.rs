pub mod board;
pub mod legal;
pub mod san;
pub mod types;

pub use board::Board;
pub use legal::{LegalMoveSet, MatchPolicy, MoveRejection};
pub use san::{Castle, Token};
pub use types::*;
