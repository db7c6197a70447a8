//! Game rules for connect four.
//!
//! Pure functions over a [`Board`](crate::Board). Rules are kept apart from
//! the engine so they can be tested against hand-built positions.

pub mod draw;
pub mod win;

pub use draw::is_full;
pub use win::{DIRECTIONS, wins_at};
