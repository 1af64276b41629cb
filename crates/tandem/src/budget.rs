//! Typed handle for shared-budget sessions.

use std::ops::Deref;

use tandem_budget::{
    BudgetMessage, BudgetSync, Dataset, LocalId, NewCategory, NewTransaction, RecordStore,
    SyncEvent, TransactionPatch,
};
use tandem_session::{Outbox, SessionHandle};

use crate::TandemError;

type SyncOutbox = Outbox<BudgetMessage, SyncEvent>;

/// A [`SessionHandle`] running [`BudgetSync`] over a store `S`.
///
/// Every mutation runs on the session actor, so local edits and incoming
/// peer changes are applied one at a time.
pub struct BudgetSession<S: RecordStore> {
    handle: SessionHandle<BudgetSync<S>>,
}

impl<S: RecordStore> BudgetSession<S> {
    pub fn new(handle: SessionHandle<BudgetSync<S>>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &SessionHandle<BudgetSync<S>> {
        &self.handle
    }

    pub async fn add_transaction(&self, new: NewTransaction) -> Result<LocalId, TandemError> {
        let id = self
            .handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| sync.add_transaction(new, out))
            .await??;
        Ok(id)
    }

    pub async fn update_transaction(&self, id: LocalId, patch: TransactionPatch) -> Result<(), TandemError> {
        self.handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| {
                sync.update_transaction(id, patch, out)
            })
            .await??;
        Ok(())
    }

    pub async fn delete_transaction(&self, id: LocalId) -> Result<(), TandemError> {
        self.handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| sync.delete_transaction(id, out))
            .await??;
        Ok(())
    }

    /// Deletes all of `ids` or none of them.
    pub async fn delete_transactions(&self, ids: Vec<LocalId>) -> Result<usize, TandemError> {
        let count = self
            .handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| {
                sync.delete_transactions(&ids, out)
            })
            .await??;
        Ok(count)
    }

    pub async fn import_transactions(&self, batch: Vec<NewTransaction>) -> Result<Vec<LocalId>, TandemError> {
        let ids = self
            .handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| {
                sync.import_transactions(batch, out)
            })
            .await??;
        Ok(ids)
    }

    pub async fn add_category(&self, new: NewCategory) -> Result<LocalId, TandemError> {
        let id = self
            .handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| sync.add_category(new, out))
            .await??;
        Ok(id)
    }

    pub async fn delete_category(&self, id: LocalId) -> Result<(), TandemError> {
        self.handle
            .call(move |sync: &mut BudgetSync<S>, out: &mut SyncOutbox| sync.delete_category(id, out))
            .await??;
        Ok(())
    }

    /// A copy of the working dataset.
    pub async fn snapshot(&self) -> Result<Dataset, TandemError> {
        let dataset = self
            .handle
            .call(|sync: &mut BudgetSync<S>, _: &mut SyncOutbox| Dataset::capture(sync.store()))
            .await?;
        Ok(dataset)
    }

    /// True while a pre-session backup is held, i.e. between session start
    /// and end.
    pub async fn has_backup(&self) -> Result<bool, TandemError> {
        let held = self
            .handle
            .call(|sync: &mut BudgetSync<S>, _: &mut SyncOutbox| sync.backup().is_some())
            .await?;
        Ok(held)
    }
}

impl<S: RecordStore> Clone for BudgetSession<S> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<S: RecordStore> Deref for BudgetSession<S> {
    type Target = SessionHandle<BudgetSync<S>>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<S: RecordStore> From<SessionHandle<BudgetSync<S>>> for BudgetSession<S> {
    fn from(handle: SessionHandle<BudgetSync<S>>) -> Self {
        Self::new(handle)
    }
}
