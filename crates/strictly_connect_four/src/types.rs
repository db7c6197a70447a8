//! Core domain types for connect four.

use serde::{Deserialize, Serialize};

/// Number of rows on the board. Row 0 is the top, row 5 the bottom.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// A player's fixed position within a pairing.
///
/// Seat one always moves first. On the wire a seat is the integer 1 or 2.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    /// Seat 1 (moves first).
    First,
    /// Seat 2.
    Second,
}

impl Seat {
    /// Returns the other seat.
    pub fn opponent(self) -> Self {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    /// Returns the seat number (1 or 2).
    pub fn number(self) -> u8 {
        match self {
            Seat::First => 1,
            Seat::Second => 2,
        }
    }

    /// Returns the piece symbol used in text rendering.
    pub fn symbol(self) -> char {
        match self {
            Seat::First => 'X',
            Seat::Second => 'O',
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> Self {
        seat.number()
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::First),
            2 => Ok(Seat::Second),
            other => Err(format!("invalid seat number {}", other)),
        }
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

/// A cell on the board. On the wire: 0 empty, 1 seat one, 2 seat two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cell {
    /// Empty cell.
    #[default]
    Empty,
    /// Cell holding a seat's piece.
    Occupied(Seat),
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => 0,
            Cell::Occupied(seat) => seat.number(),
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Empty),
            other => Seat::try_from(other).map(Cell::Occupied),
        }
    }
}

/// Row-major grid of cells, `ROWS` x `COLS`.
pub type Grid = [[Cell; COLS]; ROWS];

/// 6x7 connect-four board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: Grid,
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; COLS]; ROWS],
        }
    }

    /// Gets the cell at the given row and column.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Returns the lowest empty row in a column, or `None` when the column is
    /// full or out of range.
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.cells[row][col] == Cell::Empty)
    }

    /// Drops a piece into a column. Returns the row it landed in.
    pub(crate) fn drop_piece(&mut self, col: usize, seat: Seat) -> Option<usize> {
        let row = self.landing_row(col)?;
        self.cells[row][col] = Cell::Occupied(seat);
        Some(row)
    }

    /// Returns a copy of the grid.
    pub fn grid(&self) -> Grid {
        self.cells
    }

    /// Builds a board from a grid. Gravity is not checked.
    pub fn from_grid(cells: Grid) -> Self {
        Self { cells }
    }

    /// Formats the board as a human-readable string.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in &self.cells {
            for (col, cell) in row.iter().enumerate() {
                let symbol = match cell {
                    Cell::Empty => '.',
                    Cell::Occupied(seat) => seat.symbol(),
                };
                result.push(symbol);
                if col + 1 < COLS {
                    result.push(' ');
                }
            }
            result.push('\n');
        }
        let footer: Vec<String> = (0..COLS).map(|c| c.to_string()).collect();
        result.push_str(&footer.join(" "));
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// Current status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Round is ongoing.
    InProgress,
    /// Round ended with four in a row for this seat.
    Won(Seat),
    /// Board filled with no winner.
    Draw,
}

impl GameStatus {
    /// Returns true for `Won` and `Draw`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

/// Immutable copy of a session's board for broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Grid copy, row 0 at the top.
    pub grid: Grid,
    /// Seat to move. After a win this is the winner.
    pub current_seat: Seat,
    /// Round status.
    pub status: GameStatus,
}

impl BoardSnapshot {
    /// Renders the snapshot's grid as text.
    pub fn display(&self) -> String {
        Board::from_grid(self.grid).display()
    }
}
