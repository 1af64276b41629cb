//! Wire messages of the budget sync protocol.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::ids::SyncId;
use crate::record::{Category, Transaction};

/// A budget sync message: `{"type": "ADD_TRANSACTION", "payload": {...}}`.
///
/// The payload sits beside the tag rather than flattened into it because
/// records have a `type` field of their own.
///
/// There is no schema version on the wire; both peers are assumed to run
/// the same build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BudgetMessage {
    /// The host's whole dataset, sent once per connection.
    InitialSync(Dataset),
    AddTransaction(Transaction),
    UpdateTransaction(Transaction),
    DeleteTransaction { sync_id: SyncId },
    AddCategory(Category),
    DeleteCategory { sync_id: SyncId },
}

impl BudgetMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialSync(_) => "INITIAL_SYNC",
            Self::AddTransaction(_) => "ADD_TRANSACTION",
            Self::UpdateTransaction(_) => "UPDATE_TRANSACTION",
            Self::DeleteTransaction { .. } => "DELETE_TRANSACTION",
            Self::AddCategory(_) => "ADD_CATEGORY",
            Self::DeleteCategory { .. } => "DELETE_CATEGORY",
        }
    }
}
