//! Whole-store snapshots: the `INITIAL_SYNC` payload and the pre-session
//! backup.

use serde::{Deserialize, Serialize};

use crate::record::{Category, Settings, Transaction};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub transactions: Vec<Transaction>,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub settings: Option<Settings>,
}

impl Dataset {
    /// Copies everything in `store`, local ids included.
    pub fn capture<S: RecordStore>(store: &S) -> Self {
        Self {
            transactions: store.transactions().all(),
            categories: store.categories().all(),
            settings: store.settings().first().cloned(),
        }
    }

    /// Replaces the contents of `store` with this snapshot, ids and all.
    pub fn restore_into<S: RecordStore>(&self, store: &mut S) -> Result<(), StoreError> {
        store.atomically(|s| {
            clear(s);
            s.transactions_mut().bulk_add(self.transactions.iter().cloned())?;
            s.categories_mut().bulk_add(self.categories.iter().cloned())?;
            if let Some(settings) = &self.settings {
                s.settings_mut().add(settings.clone())?;
            }
            Ok(())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.categories.is_empty() && self.settings.is_none()
    }
}

/// Empties every collection of `store`.
pub fn clear<S: RecordStore>(store: &mut S) {
    store.transactions_mut().clear();
    store.categories_mut().clear();
    store.settings_mut().clear();
}
