//! Tic-tac-toe session: a 3x3 grid, human as X, engine as O.

use crate::game::{BoardSnapshot, DrawReason, GameOutcome, GameStatus};
use rand::Rng;
use rand::seq::SliceRandom;

/// One cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Human,
    Engine,
}

/// State of one tic-tac-toe game.
#[derive(Debug)]
pub struct TicTacToeGame {
    cells: [[Cell; 3]; 3],
    status: GameStatus,
    human_turn: bool,
}

impl TicTacToeGame {
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; 3]; 3],
            status: GameStatus::InProgress,
            human_turn: true,
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::TicTacToe { cells: self.cells }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn human_turn(&self) -> bool {
        self.human_turn && self.status == GameStatus::InProgress
    }

    /// Place the human mark at (`row`, `col`).
    ///
    /// Rejected (returning `false`, mutating nothing) when the game is over,
    /// it is not the human's turn, the coordinates are off-board, or the
    /// cell is already occupied, which is also how clicks on superseded
    /// board snapshots fall out.
    pub fn apply_human(&mut self, row: u8, col: u8) -> bool {
        if !self.human_turn() || row > 2 || col > 2 {
            return false;
        }
        let cell = &mut self.cells[row as usize][col as usize];
        if *cell != Cell::Empty {
            return false;
        }
        *cell = Cell::Human;
        self.human_turn = false;
        self.refresh_status();
        true
    }

    /// Place the engine mark on a uniformly random empty cell.
    pub fn apply_engine<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.status != GameStatus::InProgress || self.human_turn {
            return false;
        }
        let open: Vec<(usize, usize)> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .filter(|&(r, c)| self.cells[r][c] == Cell::Empty)
            .collect();
        let Some(&(r, c)) = open.choose(rng) else {
            return false;
        };
        self.cells[r][c] = Cell::Engine;
        self.human_turn = true;
        self.refresh_status();
        true
    }

    fn refresh_status(&mut self) {
        self.status = match check_winner(&self.cells) {
            Some(Cell::Human) => GameStatus::Over(GameOutcome::HumanWin),
            Some(Cell::Engine) => GameStatus::Over(GameOutcome::EngineWin),
            _ if is_full(&self.cells) => {
                GameStatus::Over(GameOutcome::Draw(DrawReason::BoardFull))
            }
            _ => GameStatus::InProgress,
        };
    }
}

impl Default for TicTacToeGame {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the mark holding three in a row, if any.
pub fn check_winner(cells: &[[Cell; 3]; 3]) -> Option<Cell> {
    const LINES: [[(usize, usize); 3]; 8] = [
        [(0, 0), (0, 1), (0, 2)],
        [(1, 0), (1, 1), (1, 2)],
        [(2, 0), (2, 1), (2, 2)],
        [(0, 0), (1, 0), (2, 0)],
        [(0, 1), (1, 1), (2, 1)],
        [(0, 2), (1, 2), (2, 2)],
        [(0, 0), (1, 1), (2, 2)],
        [(0, 2), (1, 1), (2, 0)],
    ];
    for line in LINES {
        let first = cells[line[0].0][line[0].1];
        if first != Cell::Empty && line.iter().all(|&(r, c)| cells[r][c] == first) {
            return Some(first);
        }
    }
    None
}

fn is_full(cells: &[[Cell; 3]; 3]) -> bool {
    cells
        .iter()
        .all(|row| row.iter().all(|&c| c != Cell::Empty))
}
