//! Draw detection for connect four.

use crate::types::{Board, COLS, Cell};
use tracing::instrument;

/// Checks if the board is full.
///
/// Pieces stack from the bottom, so the board is full exactly when every
/// cell of the top row is occupied.
#[instrument(skip(board))]
pub fn is_full(board: &Board) -> bool {
    (0..COLS).all(|col| board.get(0, col) != Some(Cell::Empty))
}
