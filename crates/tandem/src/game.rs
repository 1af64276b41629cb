//! Typed handle for Connect Four sessions.

use std::ops::Deref;

use tandem_game::{ConnectFour, GameEvent, GameMessage, GameState, Player};
use tandem_session::{Outbox, SessionHandle};

use crate::TandemError;

type GameOutbox = Outbox<GameMessage, GameEvent>;

/// A [`SessionHandle`] running [`ConnectFour`], with the game's actions as
/// async methods.
///
/// Derefs to the underlying handle for `host`, `join`, `end`, `subscribe`
/// and the other lifecycle calls.
#[derive(Clone)]
pub struct GameSession {
    handle: SessionHandle<ConnectFour>,
}

impl GameSession {
    pub fn new(handle: SessionHandle<ConnectFour>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &SessionHandle<ConnectFour> {
        &self.handle
    }

    /// Drops a piece in `column`. Returns the row it landed in.
    pub async fn play(&self, column: usize) -> Result<usize, TandemError> {
        let row = self
            .handle
            .call(move |game: &mut ConnectFour, out: &mut GameOutbox| game.play(column, out))
            .await??;
        Ok(row)
    }

    /// Starts a new round. Scores carry over.
    pub async fn restart(&self) -> Result<(), TandemError> {
        self.handle
            .call(|game: &mut ConnectFour, out: &mut GameOutbox| game.restart(out))
            .await?;
        Ok(())
    }

    pub async fn rename(&self, name: impl Into<String>) -> Result<(), TandemError> {
        let name = name.into();
        self.handle
            .call(move |game: &mut ConnectFour, out: &mut GameOutbox| game.rename(name, out))
            .await?;
        Ok(())
    }

    pub async fn chat(&self, text: impl Into<String>) -> Result<(), TandemError> {
        let text = text.into();
        self.handle
            .call(move |game: &mut ConnectFour, out: &mut GameOutbox| game.send_chat(text, out))
            .await??;
        Ok(())
    }

    /// A copy of the current game state.
    pub async fn state(&self) -> Result<GameState, TandemError> {
        let state = self
            .handle
            .call(|game: &mut ConnectFour, _: &mut GameOutbox| game.state().clone())
            .await?;
        Ok(state)
    }

    pub async fn me(&self) -> Result<Option<Player>, TandemError> {
        let me = self
            .handle
            .call(|game: &mut ConnectFour, _: &mut GameOutbox| game.me())
            .await?;
        Ok(me)
    }

    pub async fn opponent_name(&self) -> Result<String, TandemError> {
        let name = self
            .handle
            .call(|game: &mut ConnectFour, _: &mut GameOutbox| game.opponent_name().to_string())
            .await?;
        Ok(name)
    }
}

impl Deref for GameSession {
    type Target = SessionHandle<ConnectFour>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl From<SessionHandle<ConnectFour>> for GameSession {
    fn from(handle: SessionHandle<ConnectFour>) -> Self {
        Self::new(handle)
    }
}
