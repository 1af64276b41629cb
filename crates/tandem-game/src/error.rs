//! Errors for local game actions.

use crate::board::COLS;

/// Why a local action was refused. Remote messages never produce these;
/// they are logged and dropped instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("no opponent connected")]
    NotConnected,

    #[error("game is over")]
    GameOver,

    #[error("not your turn")]
    NotYourTurn,

    #[error("column {0} is out of range (0-{max})", max = COLS - 1)]
    InvalidColumn(usize),

    #[error("column {0} is full")]
    ColumnFull(usize),
}
