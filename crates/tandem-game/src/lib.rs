//! Connect Four over a Tandem session.
//!
//! [`ConnectFour`] is a [`SessionProtocol`](tandem_session::SessionProtocol):
//! plug it into a session driver and two peers play against each other
//! with no server deciding who is right. Each peer validates its own moves
//! and trusts the other's, so the protocol has to settle the one race the
//! rules allow: both players dropping a piece before either hears from the
//! other at the unclaimed opening. The host always wins that race.
//!
//! # Messages
//!
//! | Type | When |
//! |------|------|
//! | `MOVE` | after every accepted local move, tagged with the turn it was played on |
//! | `SYNC` | on connect, and in reply to `IDENTITY` once the game is underway |
//! | `RESTART` | new game, scores kept |
//! | `IDENTITY` | on connect and on rename |
//! | `CHAT` | free text |

mod board;
mod error;
mod message;
mod protocol;
mod state;

pub use board::{Board, COLS, Player, ROWS};
pub use error::GameError;
pub use message::GameMessage;
pub use protocol::{ConnectFour, GameEvent};
pub use state::{GameState, Outcome, Scores};
