//! # Tandem
//!
//! Two-party peer-to-peer sessions for local-first apps.
//!
//! Two people pair up with a short code read out loud; Tandem keeps the
//! link alive with heartbeats, reconnects with backoff when it drops, and
//! runs a [`SessionProtocol`](tandem_session::SessionProtocol) on both
//! ends. Two protocols ship with it: a Connect Four game
//! ([`GameSession`]) and a shared budget ([`BudgetSession`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # async fn run() -> Result<(), TandemError> {
//! let hub = MemoryHub::new();
//! let builder = TandemBuilder::new();
//! let ada = builder.spawn_game(hub.signaling(), "Ada");
//! let bob = builder.spawn_game(hub.signaling(), "Bob");
//!
//! let code = ada.host().await?;
//! bob.join(code).await?;
//! ada.wait_connected().await?;
//! ada.play(3).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Binaries usually call [`logging::init`] first.

mod budget;
mod builder;
mod error;
mod game;
pub mod logging;

pub use budget::BudgetSession;
pub use builder::TandemBuilder;
pub use error::TandemError;
pub use game::GameSession;

pub use tandem_budget as budget_sync;
pub use tandem_game as connect_four;
pub use tandem_link as link;
pub use tandem_protocol as protocol;
pub use tandem_session as session;
pub use tandem_transport as transport;

pub mod prelude {
    pub use std::time::Duration;

    pub use tandem_budget::{
        BudgetSync, Category, Dataset, LocalId, MemoryStore, NewCategory, NewTransaction,
        RecordStore, SyncEvent, SyncId, TransactionKind, TransactionPatch,
    };
    pub use tandem_game::{ConnectFour, GameEvent, GameState, Outcome, Player};
    pub use tandem_link::{HeartbeatConfig, ReconnectConfig};
    pub use tandem_session::{
        Outbox, Role, SessionConfig, SessionEvent, SessionHandle, SessionProtocol, Subscription,
    };
    pub use tandem_transport::{MemoryHub, PeerCode, RelayServer, Signaling, WebSocketSignaling};

    pub use crate::{BudgetSession, GameSession, TandemBuilder, TandemError};
}
