//! The record store boundary.
//!
//! [`RecordStore`] is what the sync protocol needs from local persistence:
//! three keyed collections and an all-or-nothing scope spanning them.
//! [`MemoryStore`] keeps everything in memory and rolls back by snapshot.

use std::collections::{BTreeMap, HashMap};

use crate::ids::{LocalId, SyncId};
use crate::record::{Category, Record, Settings, Transaction};

/// Errors from a [`RecordStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no record {id} in {collection}")]
    NotFound {
        collection: &'static str,
        id: LocalId,
    },

    #[error("{collection} already has a record with sync id {sync_id}")]
    DuplicateSyncId {
        collection: &'static str,
        sync_id: SyncId,
    },

    #[error("{collection} already has a record {id}")]
    DuplicateId {
        collection: &'static str,
        id: LocalId,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One collection of records keyed by [`LocalId`], with a unique index on
/// the sync id.
#[derive(Debug, Clone)]
pub struct Collection<R> {
    rows: BTreeMap<LocalId, R>,
    by_sync_id: HashMap<SyncId, LocalId>,
    next_id: u64,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_sync_id: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<R: Record> Collection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LocalId) -> Option<&R> {
        self.rows.get(&id)
    }

    /// Inserts `record`. A record that already carries a local id keeps it;
    /// otherwise the next free id is assigned.
    pub fn add(&mut self, mut record: R) -> Result<LocalId, StoreError> {
        let id = match record.local_id() {
            Some(id) if self.rows.contains_key(&id) => {
                return Err(StoreError::DuplicateId {
                    collection: R::COLLECTION,
                    id,
                });
            }
            Some(id) => id,
            None => LocalId(self.next_id),
        };
        if let Some(sync_id) = record.sync_id() {
            if self.by_sync_id.contains_key(&sync_id) {
                return Err(StoreError::DuplicateSyncId {
                    collection: R::COLLECTION,
                    sync_id,
                });
            }
            self.by_sync_id.insert(sync_id, id);
        }
        record.set_local_id(Some(id));
        self.next_id = self.next_id.max(id.0 + 1);
        self.rows.insert(id, record);
        Ok(id)
    }

    /// Applies `change` to the record at `id`. The local id cannot change;
    /// the sync id can, as long as it stays unique.
    pub fn update(&mut self, id: LocalId, change: impl FnOnce(&mut R)) -> Result<(), StoreError> {
        let current = self.rows.get(&id).ok_or(StoreError::NotFound {
            collection: R::COLLECTION,
            id,
        })?;
        let old_sync_id = current.sync_id();
        let mut updated = current.clone();
        change(&mut updated);
        updated.set_local_id(Some(id));

        let new_sync_id = updated.sync_id();
        if new_sync_id != old_sync_id {
            if let Some(sync_id) = new_sync_id {
                if self.by_sync_id.contains_key(&sync_id) {
                    return Err(StoreError::DuplicateSyncId {
                        collection: R::COLLECTION,
                        sync_id,
                    });
                }
                self.by_sync_id.insert(sync_id, id);
            }
            if let Some(old) = old_sync_id {
                self.by_sync_id.remove(&old);
            }
        }
        self.rows.insert(id, updated);
        Ok(())
    }

    pub fn delete(&mut self, id: LocalId) -> Result<R, StoreError> {
        let record = self.rows.remove(&id).ok_or(StoreError::NotFound {
            collection: R::COLLECTION,
            id,
        })?;
        if let Some(sync_id) = record.sync_id() {
            self.by_sync_id.remove(&sync_id);
        }
        Ok(record)
    }

    /// Adds every record or none of them.
    pub fn bulk_add(&mut self, records: impl IntoIterator<Item = R>) -> Result<Vec<LocalId>, StoreError> {
        let snapshot = self.clone();
        let mut ids = Vec::new();
        for record in records {
            match self.add(record) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    *self = snapshot;
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    /// Removes every record. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.by_sync_id.clear();
    }

    pub fn find_by_sync_id(&self, sync_id: &SyncId) -> Option<&R> {
        self.by_sync_id.get(sync_id).and_then(|id| self.rows.get(id))
    }

    /// Records in local-id order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    pub fn all(&self) -> Vec<R> {
        self.rows.values().cloned().collect()
    }

    pub fn first(&self) -> Option<&R> {
        self.rows.values().next()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Local persistence as seen by the sync protocol.
///
/// Implementations provide the three collections and a scope in which
/// changes either all land or all disappear. Scopes may nest; only the
/// outermost commit makes changes final.
pub trait RecordStore: Send + 'static {
    fn transactions(&self) -> &Collection<Transaction>;
    fn transactions_mut(&mut self) -> &mut Collection<Transaction>;
    fn categories(&self) -> &Collection<Category>;
    fn categories_mut(&mut self) -> &mut Collection<Category>;
    fn settings(&self) -> &Collection<Settings>;
    fn settings_mut(&mut self) -> &mut Collection<Settings>;

    fn begin(&mut self);
    /// Closes the innermost scope. On error the scope is still open and
    /// must be rolled back.
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self);

    /// Runs `f` in one all-or-nothing scope: an error from `f` or from the
    /// commit undoes every change `f` made.
    fn atomically<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
    {
        self.begin();
        let result = f(self).and_then(|value| self.commit().map(|()| value).map_err(E::from));
        if result.is_err() {
            self.rollback();
        }
        result
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    transactions: Collection<Transaction>,
    categories: Collection<Category>,
    settings: Collection<Settings>,
}

/// An in-memory [`RecordStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
    savepoints: Vec<Tables>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded the way a fresh install is: default categories and
    /// default settings.
    pub fn with_defaults(categories: impl IntoIterator<Item = Category>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.tables.categories.bulk_add(categories)?;
        store.tables.settings.add(Settings::default())?;
        Ok(store)
    }

    /// While set, every outermost commit fails and its scope rolls back.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }
}

impl RecordStore for MemoryStore {
    fn transactions(&self) -> &Collection<Transaction> {
        &self.tables.transactions
    }

    fn transactions_mut(&mut self) -> &mut Collection<Transaction> {
        &mut self.tables.transactions
    }

    fn categories(&self) -> &Collection<Category> {
        &self.tables.categories
    }

    fn categories_mut(&mut self) -> &mut Collection<Category> {
        &mut self.tables.categories
    }

    fn settings(&self) -> &Collection<Settings> {
        &self.tables.settings
    }

    fn settings_mut(&mut self) -> &mut Collection<Settings> {
        &mut self.tables.settings
    }

    fn begin(&mut self) {
        self.savepoints.push(self.tables.clone());
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.failing && self.savepoints.len() == 1 {
            return Err(StoreError::Unavailable("commit rejected".into()));
        }
        self.savepoints.pop();
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(saved) = self.savepoints.pop() {
            self.tables = saved;
        }
    }
}
