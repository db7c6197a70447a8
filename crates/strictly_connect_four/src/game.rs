//! Game engine for connect four.

use crate::action::{MoveError, MoveOutcome};
use crate::rules;
use crate::types::{Board, BoardSnapshot, COLS, GameStatus, Seat};
use tracing::{debug, instrument};

/// Authoritative state of one round: board, seat to move, status.
///
/// Every mutation goes through [`Game::make_move`] or [`Game::reset`];
/// callers only ever see copies via [`Game::snapshot`].
#[derive(Debug, Clone)]
pub struct Game {
    board: Board,
    to_move: Seat,
    status: GameStatus,
    history: Vec<usize>,
}

impl Game {
    /// Creates a new round: empty board, seat one to move.
    #[instrument]
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            to_move: Seat::First,
            status: GameStatus::InProgress,
            history: Vec::new(),
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the seat whose turn it is.
    pub fn to_move(&self) -> Seat {
        self.to_move
    }

    /// Returns the round status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Returns the columns played this round, in order.
    pub fn history(&self) -> &[usize] {
        &self.history
    }

    /// Drops `seat`'s piece into `column`.
    ///
    /// Checks run in order and stop at the first failure: the round is not
    /// over, it is `seat`'s turn, the column is in range, the column has room.
    /// A rejected move leaves the game untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`MoveError`] for the first failed check.
    #[instrument(skip(self), fields(to_move = ?self.to_move))]
    pub fn make_move(&mut self, seat: Seat, column: i64) -> Result<MoveOutcome, MoveError> {
        if self.status.is_terminal() {
            return Err(MoveError::GameOver);
        }

        if seat != self.to_move {
            return Err(MoveError::NotYourTurn {
                to_move: self.to_move,
            });
        }

        let col = usize::try_from(column)
            .ok()
            .filter(|&c| c < COLS)
            .ok_or(MoveError::ColumnOutOfRange { column })?;

        let row = self
            .board
            .drop_piece(col, seat)
            .ok_or(MoveError::ColumnFull { column: col })?;
        self.history.push(col);

        if rules::wins_at(&self.board, row, col, seat) {
            self.status = GameStatus::Won(seat);
        } else if rules::is_full(&self.board) {
            self.status = GameStatus::Draw;
        } else {
            self.to_move = seat.opponent();
        }

        debug!(row, col, status = ?self.status, "Piece placed");

        Ok(MoveOutcome {
            seat,
            row,
            column: col,
            status: self.status,
        })
    }

    /// Starts a fresh round in place.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns an owned copy of the current state.
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            grid: self.board.grid(),
            current_seat: self.to_move,
            status: self.status,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, ROWS};

    /// Plays columns alternately starting with seat one.
    fn play(game: &mut Game, columns: &[i64]) {
        for &col in columns {
            let seat = game.to_move();
            game.make_move(seat, col).expect("move should be legal");
        }
    }

    /// A full 42-move sequence that never completes four in a row.
    const DRAW_SEQUENCE: [i64; 42] = [
        5, 4, 5, 0, 6, 2, 4, 5, 5, 0, 4, 1, 1, 0, 4, 5, 6, 5, 3, 1, 1, 2, 2, 6, 2, 6, 6, 3, 6,
        2, 0, 3, 0, 3, 3, 4, 3, 1, 4, 2, 1, 0,
    ];

    #[test]
    fn test_new_game_seat_one_to_move() {
        let game = Game::new();
        assert_eq!(game.to_move(), Seat::First);
        assert_eq!(game.status(), GameStatus::InProgress);
        assert!(game.history().is_empty());
    }

    #[test]
    fn test_piece_falls_to_lowest_empty_row() {
        let mut game = Game::new();
        let first = game.make_move(Seat::First, 3).expect("legal");
        assert_eq!(first.row, ROWS - 1);
        let second = game.make_move(Seat::Second, 3).expect("legal");
        assert_eq!(second.row, ROWS - 2);
        assert_eq!(game.board().get(ROWS - 2, 3), Some(Cell::Occupied(Seat::Second)));
    }

    #[test]
    fn test_turn_alternates() {
        let mut game = Game::new();
        game.make_move(Seat::First, 0).expect("legal");
        assert_eq!(game.to_move(), Seat::Second);
        game.make_move(Seat::Second, 0).expect("legal");
        assert_eq!(game.to_move(), Seat::First);
    }

    #[test]
    fn test_out_of_turn_rejected_without_change() {
        let mut game = Game::new();
        let before = game.snapshot();
        let err = game.make_move(Seat::Second, 0).unwrap_err();
        assert_eq!(err, MoveError::NotYourTurn { to_move: Seat::First });
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn test_column_out_of_range_rejected() {
        let mut game = Game::new();
        for col in [-1, 7, 100] {
            let err = game.make_move(Seat::First, col).unwrap_err();
            assert_eq!(err, MoveError::ColumnOutOfRange { column: col });
        }
        assert_eq!(game.to_move(), Seat::First);
    }

    #[test]
    fn test_turn_checked_before_column_range() {
        let mut game = Game::new();
        let err = game.make_move(Seat::Second, 42).unwrap_err();
        assert_eq!(err, MoveError::NotYourTurn { to_move: Seat::First });
    }

    #[test]
    fn test_full_column_rejected() {
        let mut game = Game::new();
        play(&mut game, &[2, 2, 2, 2, 2, 2]);
        let before = game.snapshot();
        let err = game.make_move(Seat::First, 2).unwrap_err();
        assert_eq!(err, MoveError::ColumnFull { column: 2 });
        assert_eq!(game.snapshot(), before);
        assert_eq!(game.to_move(), Seat::First);
    }

    #[test]
    fn test_horizontal_win_on_bottom_row() {
        let mut game = Game::new();
        play(&mut game, &[0, 0, 1, 1, 2, 2]);
        let outcome = game.make_move(Seat::First, 3).expect("legal");
        assert_eq!(outcome.status, GameStatus::Won(Seat::First));
        assert_eq!(outcome.row, ROWS - 1);
        let snap = game.snapshot();
        assert_eq!(snap.status, GameStatus::Won(Seat::First));
        assert_eq!(snap.current_seat, Seat::First);
    }

    #[test]
    fn test_vertical_win_for_second_seat() {
        let mut game = Game::new();
        play(&mut game, &[0, 6, 1, 6, 0, 6, 1]);
        let outcome = game.make_move(Seat::Second, 6).expect("legal");
        assert_eq!(outcome.status, GameStatus::Won(Seat::Second));
    }

    #[test]
    fn test_diagonal_up_right_win() {
        let mut game = Game::new();
        // Seat one builds (5,0) (4,1) (3,2) (2,3).
        play(&mut game, &[0, 1, 1, 2, 2, 3, 2, 3, 3, 6]);
        let outcome = game.make_move(Seat::First, 3).expect("legal");
        assert_eq!(outcome.status, GameStatus::Won(Seat::First));
    }

    #[test]
    fn test_terminal_game_rejects_all_moves() {
        let mut game = Game::new();
        play(&mut game, &[0, 0, 1, 1, 2, 2, 3]);
        let before = game.snapshot();
        assert_eq!(game.make_move(Seat::Second, 4), Err(MoveError::GameOver));
        assert_eq!(game.make_move(Seat::First, 4), Err(MoveError::GameOver));
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn test_full_board_without_line_is_draw() {
        let mut game = Game::new();
        play(&mut game, &DRAW_SEQUENCE[..41]);
        assert_eq!(game.status(), GameStatus::InProgress);
        let seat = game.to_move();
        let outcome = game.make_move(seat, DRAW_SEQUENCE[41]).expect("legal");
        assert_eq!(outcome.status, GameStatus::Draw);
        assert_eq!(game.make_move(seat.opponent(), 0), Err(MoveError::GameOver));
    }

    #[test]
    fn test_reset_clears_round() {
        let mut game = Game::new();
        play(&mut game, &[0, 0, 1, 1, 2, 2, 3]);
        game.reset();
        let snap = game.snapshot();
        assert_eq!(snap.status, GameStatus::InProgress);
        assert_eq!(snap.current_seat, Seat::First);
        assert_eq!(snap.grid, Board::new().grid());
        assert!(game.history().is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let mut game = Game::new();
        let snap = game.snapshot();
        game.make_move(Seat::First, 4).expect("legal");
        assert_eq!(snap.grid, Board::new().grid());
    }
}
