//! Shared game state: what `SYNC` carries.

use serde::{Deserialize, Serialize};

use crate::board::{Board, COLS, Player, ROWS};

/// How the current game stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    InProgress,
    Won(Player),
    Draw,
}

impl Outcome {
    pub fn is_over(self) -> bool {
        self != Self::InProgress
    }
}

/// Wins per seat. Kept across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub one: u32,
    pub two: u32,
}

impl Scores {
    pub fn get(&self, player: Player) -> u32 {
        match player {
            Player::One => self.one,
            Player::Two => self.two,
        }
    }

    pub(crate) fn credit(&mut self, player: Player) {
        match player {
            Player::One => self.one += 1,
            Player::Two => self.two += 1,
        }
    }
}

/// The full state of one game.
///
/// `turn` starts at 1 and grows by one with every accepted move.
/// `current_player` is `None` only at the unclaimed opening, where either
/// seat may move first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub board: Board,
    pub turn: u32,
    pub current_player: Option<Player>,
    pub outcome: Outcome,
    pub history: Vec<usize>,
    #[serde(default)]
    pub scores: Scores,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            board: Board::new(),
            turn: 1,
            current_player: None,
            outcome: Outcome::InProgress,
            history: Vec::new(),
            scores: Scores::default(),
        }
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `player` may move now.
    pub fn is_turn_of(&self, player: Player) -> bool {
        self.current_player == Some(player) || self.is_unclaimed_opening()
    }

    pub fn is_unclaimed_opening(&self) -> bool {
        self.turn == 1 && self.current_player.is_none()
    }

    /// Whether the turn counter, the move history and the board agree.
    /// A state received from the peer is only adopted when it does.
    pub fn is_consistent(&self) -> bool {
        let moves = self.history.len();
        moves <= ROWS * COLS
            && self.board.piece_count() == moves
            && usize::try_from(self.turn).is_ok_and(|turn| turn == moves + 1)
    }

    /// Drops `player`'s piece into `column` and settles the outcome.
    ///
    /// `next_turn` is the turn counter after the move. Returns the landing
    /// row, or `None` (state untouched) when the column is full.
    pub(crate) fn place(&mut self, column: usize, player: Player, next_turn: u32) -> Option<usize> {
        let row = self.board.drop_piece(column, player)?;
        self.history.push(column);
        self.turn = next_turn;
        self.current_player = Some(player.other());
        if self.board.has_four(player) {
            self.outcome = Outcome::Won(player);
            self.scores.credit(player);
        } else if self.board.is_full() {
            self.outcome = Outcome::Draw;
        }
        Some(row)
    }

    /// Clears the board for a new game. Scores survive.
    pub(crate) fn reset(&mut self, starting_player: Option<Player>) {
        *self = Self {
            current_player: starting_player,
            scores: self.scores,
            ..Self::default()
        };
    }

    /// Drops the local opening move so the host's can replace it.
    pub(crate) fn discard_opening(&mut self) {
        self.board = Board::new();
        self.history.clear();
    }
}
