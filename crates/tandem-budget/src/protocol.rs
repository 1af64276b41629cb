//! The budget sync session protocol.

use std::time::{SystemTime, UNIX_EPOCH};

use tandem_session::{Outbox, Role, SessionProtocol};

use crate::dataset::{self, Dataset};
use crate::error::BudgetError;
use crate::ids::{LocalId, SyncId};
use crate::merge::{self, Applied, MergeSummary};
use crate::message::BudgetMessage;
use crate::record::{Category, NewCategory, NewTransaction, Origin, Transaction, TransactionPatch};
use crate::store::{RecordStore, StoreError};

/// What the sync protocol reports to the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The local dataset was snapshotted at session start.
    BackedUp { transactions: usize, categories: usize },
    /// The collaborator's working dataset was emptied for the session.
    Cleared,
    /// The host's dataset was merged in.
    InitialSyncApplied(MergeSummary),
    TransactionChanged(SyncId),
    TransactionRemoved(SyncId),
    CategoryChanged(SyncId),
    CategoryRemoved(SyncId),
    /// A peer message could not be applied. The store is as it was before
    /// the message and the session carries on.
    MergeFailed { kind: &'static str, reason: String },
    /// The pre-session backup was put back.
    Restored,
    /// Restoring the backup failed; the working dataset is left as is.
    RestoreFailed(String),
}

type SyncOutbox = Outbox<BudgetMessage, SyncEvent>;

/// Shares a budget between a host and a collaborator.
///
/// At session start both sides snapshot their dataset. The collaborator
/// then works on an empty store that fills up with the host's data; when
/// the session ends the collaborator gets its own data back verbatim while
/// the host keeps the merged result.
#[derive(Debug)]
pub struct BudgetSync<S> {
    store: S,
    backup: Option<Dataset>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl<S: RecordStore> BudgetSync<S> {
    pub fn new(store: S) -> Self {
        Self { store, backup: None }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// The snapshot taken at session start, while a session is running.
    pub fn backup(&self) -> Option<&Dataset> {
        self.backup.as_ref()
    }

    fn category(&self, id: LocalId) -> Result<&Category, BudgetError> {
        self.store
            .categories()
            .get(id)
            .ok_or(BudgetError::CategoryNotFound(id))
    }

    fn stamp(&self, new: NewTransaction) -> Result<Transaction, BudgetError> {
        let category_sync_id = match new.category_id {
            Some(id) => Some(self.category(id)?.sync_id),
            None => None,
        };
        let now = now_millis();
        Ok(Transaction {
            id: None,
            sync_id: SyncId::new(),
            amount: new.amount,
            category_id: new.category_id,
            category_sync_id,
            date: new.date,
            description: new.description,
            created_at: now,
            modified_at: now,
            kind: new.kind,
            origin: Origin::Local,
        })
    }

    fn stored_transaction(&self, id: LocalId) -> Result<Transaction, BudgetError> {
        self.store
            .transactions()
            .get(id)
            .cloned()
            .ok_or(BudgetError::TransactionNotFound(id))
    }

    /// Records a new transaction and shares it.
    pub fn add_transaction(&mut self, new: NewTransaction, out: &mut SyncOutbox) -> Result<LocalId, BudgetError> {
        let tx = self.stamp(new)?;
        let id = self.store.transactions_mut().add(tx)?;
        let stored = self.stored_transaction(id)?;
        tracing::debug!(sync_id = %stored.sync_id, %id, "transaction added");
        out.send(BudgetMessage::AddTransaction(stored));
        Ok(id)
    }

    /// Edits a transaction and shares the result. Changing the category
    /// also updates the category reference peers resolve against.
    pub fn update_transaction(
        &mut self,
        id: LocalId,
        patch: TransactionPatch,
        out: &mut SyncOutbox,
    ) -> Result<(), BudgetError> {
        self.stored_transaction(id)?;
        let category_sync_id = match patch.category_id {
            Some(cid) => Some(self.category(cid)?.sync_id),
            None => None,
        };
        let now = now_millis();
        self.store.transactions_mut().update(id, |t| {
            if let Some(amount) = patch.amount {
                t.amount = amount;
            }
            if let Some(cid) = patch.category_id {
                t.category_id = Some(cid);
                t.category_sync_id = category_sync_id;
            }
            if let Some(date) = patch.date {
                t.date = date;
            }
            if let Some(description) = patch.description {
                t.description = description;
            }
            if let Some(kind) = patch.kind {
                t.kind = kind;
            }
            t.modified_at = now;
        })?;
        out.send(BudgetMessage::UpdateTransaction(self.stored_transaction(id)?));
        Ok(())
    }

    pub fn delete_transaction(&mut self, id: LocalId, out: &mut SyncOutbox) -> Result<(), BudgetError> {
        let removed = self
            .store
            .transactions_mut()
            .delete(id)
            .map_err(|_| BudgetError::TransactionNotFound(id))?;
        out.send(BudgetMessage::DeleteTransaction {
            sync_id: removed.sync_id,
        });
        Ok(())
    }

    /// Deletes several transactions at once. Nothing is deleted (or sent)
    /// if any id is unknown.
    pub fn delete_transactions(&mut self, ids: &[LocalId], out: &mut SyncOutbox) -> Result<usize, BudgetError> {
        let removed = self.store.atomically(|s| {
            ids.iter()
                .map(|&id| {
                    s.transactions_mut()
                        .delete(id)
                        .map_err(|_| BudgetError::TransactionNotFound(id))
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        for tx in &removed {
            out.send(BudgetMessage::DeleteTransaction { sync_id: tx.sync_id });
        }
        Ok(removed.len())
    }

    /// Adds a batch of transactions (for example from a statement import)
    /// in one scope and shares each of them.
    pub fn import_transactions(
        &mut self,
        batch: Vec<NewTransaction>,
        out: &mut SyncOutbox,
    ) -> Result<Vec<LocalId>, BudgetError> {
        let stamped = batch
            .into_iter()
            .map(|new| self.stamp(new))
            .collect::<Result<Vec<_>, _>>()?;
        let ids = self.store.transactions_mut().bulk_add(stamped)?;
        for &id in &ids {
            out.send(BudgetMessage::AddTransaction(self.stored_transaction(id)?));
        }
        tracing::info!(count = ids.len(), "transactions imported");
        Ok(ids)
    }

    pub fn add_category(&mut self, new: NewCategory, out: &mut SyncOutbox) -> Result<LocalId, BudgetError> {
        let id = self.store.categories_mut().add(Category {
            id: None,
            sync_id: SyncId::new(),
            name: new.name,
            color: new.color,
            kind: new.kind,
            is_default: false,
        })?;
        let stored = self.category(id)?.clone();
        out.send(BudgetMessage::AddCategory(stored));
        Ok(id)
    }

    /// Deletes a category. Its transactions move to the default fallback
    /// category of the same kind, and those moves are shared too.
    pub fn delete_category(&mut self, id: LocalId, out: &mut SyncOutbox) -> Result<(), BudgetError> {
        let category = self.category(id)?.clone();
        let moved = self.store.atomically(|s| -> Result<Vec<Transaction>, StoreError> {
            let fallback = merge::fallback_category(s, category.kind, id)
                .and_then(|fid| s.categories().get(fid).cloned());
            let moved = match fallback {
                Some(fallback) => merge::reassign_transactions(s, id, &fallback)?,
                None => Vec::new(),
            };
            s.categories_mut().delete(id)?;
            Ok(moved)
        })?;
        for tx in moved {
            out.send(BudgetMessage::UpdateTransaction(tx));
        }
        out.send(BudgetMessage::DeleteCategory {
            sync_id: category.sync_id,
        });
        Ok(())
    }

    fn apply(&mut self, msg: BudgetMessage) -> Result<SyncEvent, StoreError> {
        self.store.atomically(|s| match msg {
            BudgetMessage::InitialSync(dataset) => {
                merge::merge_dataset(s, dataset).map(SyncEvent::InitialSyncApplied)
            }
            BudgetMessage::AddTransaction(tx) | BudgetMessage::UpdateTransaction(tx) => {
                let sync_id = tx.sync_id;
                merge::upsert_transaction(s, tx).map(|_| SyncEvent::TransactionChanged(sync_id))
            }
            BudgetMessage::DeleteTransaction { sync_id } => {
                merge::delete_transaction(s, &sync_id).map(|_| SyncEvent::TransactionRemoved(sync_id))
            }
            BudgetMessage::AddCategory(category) => {
                let sync_id = category.sync_id;
                merge::upsert_category(s, category).map(|_| SyncEvent::CategoryChanged(sync_id))
            }
            BudgetMessage::DeleteCategory { sync_id } => {
                merge::delete_category(s, &sync_id).map(|applied| {
                    if applied == Applied::Absent {
                        tracing::debug!(%sync_id, "deleted category was not known here");
                    }
                    SyncEvent::CategoryRemoved(sync_id)
                })
            }
        })
    }
}

impl<S: RecordStore> SessionProtocol for BudgetSync<S> {
    type Message = BudgetMessage;
    type Event = SyncEvent;

    fn on_start(&mut self, role: Role, out: &mut SyncOutbox) {
        let backup = Dataset::capture(&self.store);
        out.emit(SyncEvent::BackedUp {
            transactions: backup.transactions.len(),
            categories: backup.categories.len(),
        });
        tracing::info!(
            %role,
            transactions = backup.transactions.len(),
            categories = backup.categories.len(),
            "local dataset backed up"
        );
        self.backup = Some(backup);
        if role == Role::Collaborator {
            dataset::clear(&mut self.store);
            out.emit(SyncEvent::Cleared);
        }
    }

    fn on_connected(&mut self, role: Role, out: &mut SyncOutbox) {
        if role == Role::Host {
            out.send(BudgetMessage::InitialSync(Dataset::capture(&self.store)));
        }
    }

    fn on_message(&mut self, msg: BudgetMessage, out: &mut SyncOutbox) {
        let kind = msg.kind();
        match self.apply(msg) {
            Ok(event) => {
                tracing::debug!(kind, "peer change applied");
                out.emit(event);
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "failed to apply peer change");
                out.emit(SyncEvent::MergeFailed {
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_end(&mut self, role: Role, out: &mut SyncOutbox) {
        let Some(backup) = self.backup.take() else {
            return;
        };
        if role == Role::Host {
            tracing::info!("session ended, keeping merged data");
            return;
        }
        match backup.restore_into(&mut self.store) {
            Ok(()) => {
                tracing::info!("session ended, local data restored");
                out.emit(SyncEvent::Restored);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to restore local data");
                out.emit(SyncEvent::RestoreFailed(e.to_string()));
            }
        }
    }
}
