//! Wire messages exchanged by the two game peers.

use serde::{Deserialize, Serialize};

use crate::board::Player;
use crate::state::GameState;

/// A game protocol message.
///
/// Encoded as a JSON object tagged by `"type"`:
///
/// ```json
/// {"type":"MOVE","column":3,"player":"One","turn":1}
/// {"type":"RESTART","startingPlayer":null}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum GameMessage {
    /// A piece dropped by the sender. `turn` is the sender's turn counter
    /// before the move.
    Move {
        column: usize,
        player: Player,
        turn: u32,
    },
    /// The sender's full state. Applied when it is not behind.
    Sync { state: GameState },
    /// A new game. `None` leaves the opening unclaimed.
    Restart {
        #[serde(default)]
        starting_player: Option<Player>,
    },
    /// The sender's display name.
    Identity { name: String },
    Chat { text: String },
}

impl GameMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Move { .. } => "MOVE",
            Self::Sync { .. } => "SYNC",
            Self::Restart { .. } => "RESTART",
            Self::Identity { .. } => "IDENTITY",
            Self::Chat { .. } => "CHAT",
        }
    }
}
