//! Move results and rejection reasons.

use crate::types::{GameStatus, Seat};

/// Where an accepted move landed and what it did to the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Seat that moved.
    pub seat: Seat,
    /// Row the piece came to rest in.
    pub row: usize,
    /// Column the piece was dropped into.
    pub column: usize,
    /// Round status after the move.
    pub status: GameStatus,
}

/// Error that can occur when validating or applying a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The round already ended in a win or a draw.
    #[display("The game is already over")]
    GameOver,

    /// It's the other seat's turn.
    #[display("Not your turn. Waiting for {}", to_move)]
    NotYourTurn {
        /// Seat whose turn it is.
        to_move: Seat,
    },

    /// Column index outside 0..7.
    #[display("Column {} is out of range (must be 0-6)", column)]
    ColumnOutOfRange {
        /// The requested column.
        column: i64,
    },

    /// Every cell in the column is taken.
    #[display("Column {} is full", column)]
    ColumnFull {
        /// The requested column.
        column: usize,
    },
}

impl std::error::Error for MoveError {}
