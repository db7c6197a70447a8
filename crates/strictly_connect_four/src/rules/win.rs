//! Win detection anchored at the last placed piece.

use crate::types::{Board, COLS, Cell, ROWS, Seat};
use tracing::instrument;

/// Pieces in a row needed to win.
pub const WIN_LENGTH: usize = 4;

/// The four axes checked from the anchor: horizontal, vertical,
/// diagonal down-right and diagonal up-right, as (row, column) steps.
pub const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];

/// Returns true if `seat` has four or more in a row through `(row, col)`.
///
/// Only lines passing through the anchor are considered, so this must be
/// called with the cell that was just filled.
#[instrument(skip(board))]
pub fn wins_at(board: &Board, row: usize, col: usize, seat: Seat) -> bool {
    if board.get(row, col) != Some(Cell::Occupied(seat)) {
        return false;
    }

    DIRECTIONS.iter().any(|&(dr, dc)| {
        let forward = run_length(board, row, col, dr, dc, seat);
        let backward = run_length(board, row, col, -dr, -dc, seat);
        1 + forward + backward >= WIN_LENGTH
    })
}

/// Counts consecutive `seat` pieces stepping away from the anchor, excluding
/// the anchor itself.
fn run_length(board: &Board, row: usize, col: usize, dr: isize, dc: isize, seat: Seat) -> usize {
    let mut count = 0;
    let (mut r, mut c) = (row as isize + dr, col as isize + dc);
    while (0..ROWS as isize).contains(&r) && (0..COLS as isize).contains(&c) {
        if board.get(r as usize, c as usize) != Some(Cell::Occupied(seat)) {
            break;
        }
        count += 1;
        r += dr;
        c += dc;
    }
    count
}
