//! Game-side state the UI reads: the projected view and the click-to-move
//! controller.

pub mod controller;
pub mod view;

pub use controller::{ClickOutcome, MoveCommand, MoveController};
pub use view::{ChatLine, Clocks, ConnectionStatus, ViewModel};
