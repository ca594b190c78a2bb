//! Chess session: an adapter over the `chess` rules engine.
//!
//! The rules crate answers legality, move enumeration, side-to-move, check,
//! checkmate, and stalemate; this adapter adds click-to-select handling,
//! default promotion to queen, threefold-repetition counting, and the
//! insufficient-material predicate.

use crate::game::{BoardSnapshot, DrawReason, GameOutcome, GameStatus};
use chess::{Board, BoardStatus, ChessMove, Color, File, Game, MoveGen, Piece, Rank, Square};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

const HUMAN: Color = Color::White;

/// State of one chess game. The human plays White.
pub struct ChessGame {
    game: Game,
    /// Square the human has picked as a move origin, if any. Presentation
    /// convenience only; never part of engine state.
    selected: Option<Square>,
    /// Occurrence count per position hash, for threefold repetition.
    seen_positions: HashMap<u64, u32>,
    status: GameStatus,
}

/// What a human click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A legal ply was applied.
    Applied,
    /// The selection highlight moved or cleared; no ply.
    Selection(Option<(u8, u8)>),
    /// Illegal or out-of-turn; nothing changed.
    Rejected,
}

impl ChessGame {
    pub fn new() -> Self {
        Self::from_game(Game::new())
    }

    fn from_game(game: Game) -> Self {
        let mut seen_positions = HashMap::new();
        seen_positions.insert(game.current_position().get_hash(), 1);
        let mut session = Self {
            game,
            selected: None,
            seen_positions,
            status: GameStatus::InProgress,
        };
        session.refresh_status();
        session
    }

    fn board(&self) -> Board {
        self.game.current_position()
    }

    /// Position snapshot as FEN, the serialized form the rules engine
    /// round-trips.
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::Chess {
            fen: self.board().to_string(),
        }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn human_turn(&self) -> bool {
        self.status == GameStatus::InProgress && self.board().side_to_move() == HUMAN
    }

    pub fn selected(&self) -> Option<(u8, u8)> {
        self.selected.map(square_coords)
    }

    /// Handle a click on square (`file`, `rank`), both 0-based from a1.
    ///
    /// First click selects a piece of the human's color; a second click
    /// attempts the move. An illegal target re-selects when it holds a
    /// human piece, otherwise it clears the selection. Moves are validated
    /// against the live position, so clicks replayed from superseded board
    /// snapshots are rejected like any other illegal move.
    pub fn apply_click(&mut self, file: u8, rank: u8) -> ClickOutcome {
        if !self.human_turn() {
            return ClickOutcome::Rejected;
        }
        let Some(square) = square_at(file, rank) else {
            return ClickOutcome::Rejected;
        };
        let board = self.board();

        let Some(from) = self.selected else {
            // No selection yet: only a piece of the human's color selects.
            if board.color_on(square) == Some(HUMAN) {
                self.selected = Some(square);
                return ClickOutcome::Selection(Some((file, rank)));
            }
            return ClickOutcome::Rejected;
        };

        let mv = candidate_move(&board, from, square);
        if board.legal(mv) && self.game.make_move(mv) {
            self.selected = None;
            self.record_position();
            self.refresh_status();
            return ClickOutcome::Applied;
        }

        // Rejection doubles as re-selection when the target holds a piece
        // of the human's color; otherwise the selection clears.
        if board.color_on(square) == Some(HUMAN) {
            self.selected = Some(square);
            ClickOutcome::Selection(Some((file, rank)))
        } else {
            self.selected = None;
            ClickOutcome::Selection(None)
        }
    }

    /// Play a uniformly random legal move for the engine side.
    ///
    /// Returns whether the resulting position leaves the human in check, or
    /// `None` when no engine ply is possible (terminal position or not the
    /// engine's turn).
    pub fn apply_engine<R: Rng>(&mut self, rng: &mut R) -> Option<bool> {
        if self.status != GameStatus::InProgress || self.board().side_to_move() == HUMAN {
            return None;
        }
        let board = self.board();
        let moves: Vec<ChessMove> = MoveGen::new_legal(&board).collect();
        let mv = *moves.choose(rng)?;
        if !self.game.make_move(mv) {
            return None;
        }
        self.record_position();
        self.refresh_status();

        let after = self.board();
        let gives_check = self.status == GameStatus::InProgress
            && after.side_to_move() == HUMAN
            && after.checkers().popcnt() > 0;
        Some(gives_check)
    }

    fn record_position(&mut self) {
        let hash = self.board().get_hash();
        *self.seen_positions.entry(hash).or_insert(0) += 1;
    }

    fn refresh_status(&mut self) {
        let board = self.board();
        self.status = match board.status() {
            BoardStatus::Checkmate => {
                // The side to move is the one mated.
                if board.side_to_move() == HUMAN {
                    GameStatus::Over(GameOutcome::EngineWin)
                } else {
                    GameStatus::Over(GameOutcome::HumanWin)
                }
            }
            BoardStatus::Stalemate => GameStatus::Over(GameOutcome::Draw(DrawReason::Stalemate)),
            BoardStatus::Ongoing => {
                let repeated = self
                    .seen_positions
                    .get(&board.get_hash())
                    .is_some_and(|&n| n >= 3);
                if repeated {
                    GameStatus::Over(GameOutcome::Draw(DrawReason::Repetition))
                } else if insufficient_material(&board) {
                    GameStatus::Over(GameOutcome::Draw(DrawReason::InsufficientMaterial))
                } else if self.game.can_declare_draw() {
                    GameStatus::Over(GameOutcome::Draw(DrawReason::Other))
                } else {
                    GameStatus::InProgress
                }
            }
        };
    }

    /// Apply a move for whichever side is to play, bypassing selection.
    #[cfg(test)]
    pub(crate) fn make_raw_move(&mut self, from: (u8, u8), to: (u8, u8)) -> bool {
        let (Some(from), Some(to)) = (square_at(from.0, from.1), square_at(to.0, to.1)) else {
            return false;
        };
        let mv = candidate_move(&self.board(), from, to);
        if self.game.make_move(mv) {
            self.record_position();
            self.refresh_status();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn from_fen(fen: &str) -> Self {
        use std::str::FromStr;
        let board = Board::from_str(fen).expect("valid FEN");
        Self::from_game(Game::new_with_board(board))
    }
}

impl Default for ChessGame {
    fn default() -> Self {
        Self::new()
    }
}

fn square_at(file: u8, rank: u8) -> Option<Square> {
    if file > 7 || rank > 7 {
        return None;
    }
    Some(Square::make_square(
        Rank::from_index(rank as usize),
        File::from_index(file as usize),
    ))
}

fn square_coords(square: Square) -> (u8, u8) {
    (
        square.get_file().to_index() as u8,
        square.get_rank().to_index() as u8,
    )
}

/// Build the candidate move for a from/to pair, promoting to the strongest
/// piece when a pawn reaches the back rank.
fn candidate_move(board: &Board, from: Square, to: Square) -> ChessMove {
    let promotion = match (board.piece_on(from), board.color_on(from)) {
        (Some(Piece::Pawn), Some(color)) => {
            let back_rank = match color {
                Color::White => Rank::Eighth,
                Color::Black => Rank::First,
            };
            (to.get_rank() == back_rank).then_some(Piece::Queen)
        }
        _ => None,
    };
    ChessMove::new(from, to, promotion)
}

/// Neither side can force mate: bare kings, or a lone minor piece.
fn insufficient_material(board: &Board) -> bool {
    let heavy = board.pieces(Piece::Pawn).popcnt()
        + board.pieces(Piece::Rook).popcnt()
        + board.pieces(Piece::Queen).popcnt();
    if heavy > 0 {
        return false;
    }
    let minors = board.pieces(Piece::Bishop).popcnt() + board.pieces(Piece::Knight).popcnt();
    minors <= 1
}
