//! Budget records as they are stored and as they travel on the wire.

use serde::{Deserialize, Serialize};

use crate::ids::{LocalId, SyncId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Expense,
    Income,
}

/// Who created a transaction, for attribution in the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    #[default]
    #[serde(rename = "Me")]
    Local,
    Peer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Anything kept in a [`Collection`](crate::Collection).
pub trait Record: Clone + std::fmt::Debug + Send + 'static {
    const COLLECTION: &'static str;

    fn local_id(&self) -> Option<LocalId>;
    fn set_local_id(&mut self, id: Option<LocalId>);

    /// Global identity, when the record type has one.
    fn sync_id(&self) -> Option<SyncId> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocalId>,
    pub sync_id: SyncId,
    pub amount: f64,
    /// Local category key. Only meaningful in the store that assigned it.
    #[serde(default)]
    pub category_id: Option<LocalId>,
    /// Global category reference used to remap `category_id` on merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_sync_id: Option<SyncId>,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub description: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub modified_at: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(rename = "createdBy", default)]
    pub origin: Origin,
}

impl Record for Transaction {
    const COLLECTION: &'static str = "transactions";

    fn local_id(&self) -> Option<LocalId> {
        self.id
    }

    fn set_local_id(&mut self, id: Option<LocalId>) {
        self.id = id;
    }

    fn sync_id(&self) -> Option<SyncId> {
        Some(self.sync_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocalId>,
    pub sync_id: SyncId,
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub is_default: bool,
}

impl Record for Category {
    const COLLECTION: &'static str = "categories";

    fn local_id(&self) -> Option<LocalId> {
        self.id
    }

    fn set_local_id(&mut self, id: Option<LocalId>) {
        self.id = id;
    }

    fn sync_id(&self) -> Option<SyncId> {
        Some(self.sync_id)
    }
}

/// User preferences. A store holds at most one row in practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocalId>,
    pub currency: String,
    pub theme: Theme,
    pub reminder_enabled: bool,
    /// `HH:mm`.
    pub reminder_time: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: None,
            currency: "GBP".into(),
            theme: Theme::Light,
            reminder_enabled: false,
            reminder_time: "20:00".into(),
        }
    }
}

impl Record for Settings {
    const COLLECTION: &'static str = "settings";

    fn local_id(&self) -> Option<LocalId> {
        self.id
    }

    fn set_local_id(&mut self, id: Option<LocalId>) {
        self.id = id;
    }
}

/// Fields the user supplies for a new transaction. Ids, timestamps and the
/// category reference are filled in by [`BudgetSync`](crate::BudgetSync).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub amount: f64,
    pub category_id: Option<LocalId>,
    pub date: String,
    pub description: String,
    pub kind: TransactionKind,
}

/// A partial update; `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub amount: Option<f64>,
    pub category_id: Option<LocalId>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub kind: Option<TransactionKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub kind: TransactionKind,
}
