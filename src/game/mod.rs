//! Embedded turn-based game sessions.
//!
//! Both game kinds sit behind one closed tagged variant with a uniform
//! interface, selected by kind at construction. Each ply produces an
//! immutable board snapshot for the timeline; at most one game session
//! exists per assistant session.

pub mod chess;
pub mod tictactoe;

pub use self::chess::{ChessGame, ClickOutcome};
pub use self::tictactoe::{Cell, TicTacToeGame, check_winner};

use rand::Rng;

/// Which game is being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    TicTacToe,
    Chess,
}

/// Immutable position snapshot for board widgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardSnapshot {
    TicTacToe { cells: [[Cell; 3]; 3] },
    Chess { fen: String },
}

/// Terminal classification of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    HumanWin,
    EngineWin,
    Draw(DrawReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    /// Tic-tac-toe: every cell filled without a line.
    BoardFull,
    Stalemate,
    Repetition,
    InsufficientMaterial,
    /// Any other draw the rules engine declares.
    Other,
}

/// Whether a game is still being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    Over(GameOutcome),
}

/// One live game of either kind.
pub enum GameSession {
    TicTacToe(TicTacToeGame),
    Chess(ChessGame),
}

impl GameSession {
    pub fn start(kind: GameKind) -> Self {
        match kind {
            GameKind::TicTacToe => Self::TicTacToe(TicTacToeGame::new()),
            GameKind::Chess => Self::Chess(ChessGame::new()),
        }
    }

    pub fn kind(&self) -> GameKind {
        match self {
            Self::TicTacToe(_) => GameKind::TicTacToe,
            Self::Chess(_) => GameKind::Chess,
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        match self {
            Self::TicTacToe(game) => game.snapshot(),
            Self::Chess(game) => game.snapshot(),
        }
    }

    pub fn status(&self) -> GameStatus {
        match self {
            Self::TicTacToe(game) => game.status(),
            Self::Chess(game) => game.status(),
        }
    }

    /// Offer a human click at (`x`, `y`): column/row for tic-tac-toe,
    /// file/rank for chess.
    pub fn apply_human_move(&mut self, x: u8, y: u8) -> ClickOutcome {
        match self {
            Self::TicTacToe(game) => {
                if game.apply_human(y, x) {
                    ClickOutcome::Applied
                } else {
                    ClickOutcome::Rejected
                }
            }
            Self::Chess(game) => game.apply_click(x, y),
        }
    }

    /// Play the AI ply: a uniformly random choice over the legal moves.
    ///
    /// Returns whether the ply leaves the human in check, or `None` when no
    /// ply was possible (terminal position, or not the engine's turn).
    pub fn apply_ai_move<R: Rng>(&mut self, rng: &mut R) -> Option<bool> {
        match self {
            Self::TicTacToe(game) => game.apply_engine(rng).then_some(false),
            Self::Chess(game) => game.apply_engine(rng),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status(), GameStatus::Over(_))
    }

    pub fn intro_text(&self) -> &'static str {
        match self {
            Self::TicTacToe(_) => {
                "Let's play tic-tac-toe! You're X — tap a cell to make your move."
            }
            Self::Chess(_) => {
                "Let's play chess! You're White — tap a piece, then its destination square."
            }
        }
    }

    /// Narrate a finished game in the wording of its kind.
    pub fn describe_outcome(&self, outcome: GameOutcome) -> String {
        let text = match (self.kind(), outcome) {
            (GameKind::TicTacToe, GameOutcome::HumanWin) => "You win! Three in a row.",
            (GameKind::TicTacToe, GameOutcome::EngineWin) => "I win this round — three in a row.",
            (GameKind::TicTacToe, GameOutcome::Draw(_)) => "It's a draw — the board is full.",
            (GameKind::Chess, GameOutcome::HumanWin) => "Checkmate — you win!",
            (GameKind::Chess, GameOutcome::EngineWin) => "Checkmate — I win this one.",
            (GameKind::Chess, GameOutcome::Draw(DrawReason::Stalemate)) => {
                "Stalemate — it's a draw."
            }
            (GameKind::Chess, GameOutcome::Draw(DrawReason::Repetition)) => {
                "Draw by threefold repetition."
            }
            (GameKind::Chess, GameOutcome::Draw(DrawReason::InsufficientMaterial)) => {
                "Draw — neither of us has enough material to mate."
            }
            (GameKind::Chess, GameOutcome::Draw(_)) => "It's a draw.",
        };
        text.to_owned()
    }

    pub fn forfeit_text(&self) -> &'static str {
        match self {
            Self::TicTacToe(_) => "Game abandoned — rematch any time.",
            Self::Chess(_) => "You resigned. Good game!",
        }
    }
}
