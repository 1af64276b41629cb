//! Shared budgets over a Tandem session.
//!
//! [`BudgetSync`] lets two people look at and edit one budget for the
//! length of a session. It is a best-effort, last-writer-wins exchange:
//!
//! - every record carries a [`SyncId`] minted when it was created, and
//!   peers match records by that id alone;
//! - an incoming record overwrites the local one with the same sync id or
//!   is inserted if there is none, so replaying a message changes nothing;
//! - each incoming message is applied inside one
//!   [`RecordStore::atomically`] scope, so a failure leaves no half-merged
//!   state behind.
//!
//! The host sends its whole dataset on connect (`INITIAL_SYNC`); after
//! that both sides send incremental changes as they make them.

mod dataset;
mod error;
mod ids;
pub mod merge;
mod message;
mod protocol;
mod record;
mod store;

pub use dataset::Dataset;
pub use error::BudgetError;
pub use ids::{LocalId, SyncId};
pub use message::BudgetMessage;
pub use protocol::{BudgetSync, SyncEvent};
pub use record::{
    Category, NewCategory, NewTransaction, Origin, Record, Settings, Theme, Transaction,
    TransactionKind, TransactionPatch,
};
pub use store::{Collection, MemoryStore, RecordStore, StoreError};
