//! Pure connect-four game logic.
//!
//! No I/O and no async: a [`Game`] owns one round's board, validates moves
//! against turn order and gravity, and detects wins and draws. The server
//! crate wraps it in a per-pairing session.
//!
//! # Example
//!
//! ```
//! use strictly_connect_four::{Game, GameStatus, Seat};
//!
//! let mut game = Game::new();
//! for col in [0, 0, 1, 1, 2, 2] {
//!     let seat = game.to_move();
//!     game.make_move(seat, col).unwrap();
//! }
//! let outcome = game.make_move(Seat::First, 3).unwrap();
//! assert_eq!(outcome.status, GameStatus::Won(Seat::First));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod game;
pub mod rules;
mod types;

pub use action::{MoveError, MoveOutcome};
pub use game::Game;
pub use types::{Board, BoardSnapshot, COLS, Cell, GameStatus, Grid, ROWS, Seat};
