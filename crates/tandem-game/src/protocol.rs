//! The Connect Four session protocol.

use tandem_session::{Outbox, Role, SessionProtocol};

use crate::board::{COLS, Player};
use crate::error::GameError;
use crate::message::GameMessage;
use crate::state::{GameState, Outcome};

const DEFAULT_OPPONENT: &str = "Opponent";

/// What the game reports to the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A piece landed, locally or from the peer. `turn` is the counter
    /// after the move.
    Moved {
        column: usize,
        row: usize,
        player: Player,
        turn: u32,
    },
    /// The game ended with this move.
    Finished(Outcome),
    /// The peer's state replaced ours.
    Synced { turn: u32 },
    /// Both peers opened at once; our opening move was discarded in favour
    /// of the host's.
    OpeningYielded,
    Restarted { starting_player: Option<Player> },
    OpponentNamed(String),
    Chat(String),
}

/// Connect Four between a host (player one) and a collaborator (player
/// two).
///
/// Local actions run through [`SessionHandle::call`]:
///
/// ```ignore
/// handle.call(|game: &mut ConnectFour, out| game.play(3, out)).await??;
/// ```
///
/// [`SessionHandle::call`]: tandem_session::SessionHandle::call
#[derive(Debug)]
pub struct ConnectFour {
    name: String,
    opponent: Option<String>,
    me: Option<Player>,
    connected: bool,
    state: GameState,
}

type GameOutbox = Outbox<GameMessage, GameEvent>;

impl ConnectFour {
    /// A fresh game for a player called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opponent: None,
            me: None,
            connected: false,
            state: GameState::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Our seat, known once a session has started.
    pub fn me(&self) -> Option<Player> {
        self.me
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn opponent_name(&self) -> &str {
        self.opponent.as_deref().unwrap_or(DEFAULT_OPPONENT)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_my_turn(&self) -> bool {
        self.me.is_some_and(|me| self.state.is_turn_of(me))
    }

    /// Drops our piece into `column` and tells the peer. Returns the row it
    /// landed in.
    pub fn play(&mut self, column: usize, out: &mut GameOutbox) -> Result<usize, GameError> {
        let me = match self.me {
            Some(me) if self.connected => me,
            _ => return Err(GameError::NotConnected),
        };
        if self.state.outcome.is_over() {
            return Err(GameError::GameOver);
        }
        if column >= COLS {
            return Err(GameError::InvalidColumn(column));
        }
        if !self.state.is_turn_of(me) {
            return Err(GameError::NotYourTurn);
        }

        let turn = self.state.turn;
        let next_turn = turn.checked_add(1).ok_or(GameError::GameOver)?;
        let row = self
            .state
            .place(column, me, next_turn)
            .ok_or(GameError::ColumnFull(column))?;
        tracing::debug!(column, row, turn, player = %me, "local move");

        out.send(GameMessage::Move {
            column,
            player: me,
            turn,
        });
        self.report_move(column, row, me, out);
        Ok(row)
    }

    /// Starts a new game with an unclaimed opening and tells the peer.
    pub fn restart(&mut self, out: &mut GameOutbox) {
        self.state.reset(None);
        out.send(GameMessage::Restart {
            starting_player: None,
        });
        out.emit(GameEvent::Restarted {
            starting_player: None,
        });
    }

    /// Changes our display name and announces it. While connected the
    /// current state follows, as it does after every identity exchange.
    pub fn rename(&mut self, name: impl Into<String>, out: &mut GameOutbox) {
        self.name = name.into();
        out.send(GameMessage::Identity {
            name: self.name.clone(),
        });
        if self.connected {
            out.send(GameMessage::Sync {
                state: self.state.clone(),
            });
        }
    }

    pub fn send_chat(&mut self, text: impl Into<String>, out: &mut GameOutbox) -> Result<(), GameError> {
        if !self.connected {
            return Err(GameError::NotConnected);
        }
        out.send(GameMessage::Chat { text: text.into() });
        Ok(())
    }

    fn report_move(&self, column: usize, row: usize, player: Player, out: &mut GameOutbox) {
        out.emit(GameEvent::Moved {
            column,
            row,
            player,
            turn: self.state.turn,
        });
        if self.state.outcome.is_over() {
            tracing::info!(outcome = ?self.state.outcome, "game finished");
            out.emit(GameEvent::Finished(self.state.outcome));
        }
    }

    fn remote_move(&mut self, column: usize, player: Player, turn: u32, out: &mut GameOutbox) {
        if column >= COLS {
            tracing::warn!(column, "peer moved into a column that does not exist");
            return;
        }
        if self.me == Some(player) {
            tracing::warn!(%player, "peer moved with our pieces, ignoring move");
            return;
        }
        if self.state.outcome.is_over() {
            tracing::warn!(column, "peer moved after the game ended, ignoring move");
            return;
        }
        let Some(next_turn) = turn.checked_add(1) else {
            tracing::warn!(turn, "peer turn counter out of range, ignoring move");
            return;
        };
        if self.state.turn != turn {
            let opening_race =
                turn == 1 && self.state.turn == 2 && self.me == Some(Player::Two);
            if !opening_race {
                tracing::warn!(
                    local = self.state.turn,
                    remote = turn,
                    "turn mismatch, ignoring move"
                );
                return;
            }
            tracing::info!("both peers opened, yielding to host");
            self.state.discard_opening();
            out.emit(GameEvent::OpeningYielded);
        } else if !self.state.is_turn_of(player) {
            tracing::warn!(%player, "peer moved out of turn, ignoring move");
            return;
        }

        let Some(row) = self.state.place(column, player, next_turn) else {
            tracing::debug!(column, "peer moved into a full column");
            return;
        };
        self.report_move(column, row, player, out);
    }
}

impl SessionProtocol for ConnectFour {
    type Message = GameMessage;
    type Event = GameEvent;

    fn on_start(&mut self, role: Role, _out: &mut GameOutbox) {
        self.me = Some(Player::for_role(role));
        self.opponent = None;
        self.state = GameState::new();
    }

    fn on_connected(&mut self, role: Role, out: &mut GameOutbox) {
        self.me = Some(Player::for_role(role));
        self.connected = true;
        out.send(GameMessage::Identity {
            name: self.name.clone(),
        });
        out.send(GameMessage::Sync {
            state: self.state.clone(),
        });
    }

    fn on_message(&mut self, msg: GameMessage, out: &mut GameOutbox) {
        tracing::trace!(kind = msg.kind(), "game message");
        match msg {
            GameMessage::Move {
                column,
                player,
                turn,
            } => self.remote_move(column, player, turn, out),
            GameMessage::Sync { state } => {
                if !state.is_consistent() {
                    tracing::warn!(
                        turn = state.turn,
                        moves = state.history.len(),
                        "ignoring inconsistent sync"
                    );
                } else if state.turn >= self.state.turn {
                    let turn = state.turn;
                    self.state = state;
                    out.emit(GameEvent::Synced { turn });
                } else {
                    tracing::debug!(
                        local = self.state.turn,
                        remote = state.turn,
                        "ignoring stale sync"
                    );
                }
            }
            GameMessage::Restart { starting_player } => {
                self.state.reset(starting_player);
                out.emit(GameEvent::Restarted { starting_player });
            }
            GameMessage::Identity { name } => {
                let name = name.trim();
                let name = if name.is_empty() { DEFAULT_OPPONENT } else { name };
                self.opponent = Some(name.to_owned());
                out.emit(GameEvent::OpponentNamed(name.to_owned()));
                if self.state.turn > 1 {
                    out.send(GameMessage::Sync {
                        state: self.state.clone(),
                    });
                }
            }
            GameMessage::Chat { text } => out.emit(GameEvent::Chat(text)),
        }
    }

    fn on_disconnected(&mut self, _out: &mut GameOutbox) {
        self.connected = false;
    }

    fn on_end(&mut self, _role: Role, _out: &mut GameOutbox) {
        self.connected = false;
    }
}
