//! Applying peer records to the local store.
//!
//! Records are matched by [`SyncId`] only. A match is overwritten in place
//! and keeps its local id; anything else is inserted with a fresh local id.
//! Applying the same record twice leaves the store as applying it once.
//! None of these functions open a scope of their own; callers wrap them in
//! [`RecordStore::atomically`].

use crate::dataset::Dataset;
use crate::ids::{LocalId, SyncId};
use crate::record::{Category, Origin, Settings, Transaction, TransactionKind};
use crate::store::{RecordStore, StoreError};

/// What a merge did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted(LocalId),
    Updated(LocalId),
    Deleted(LocalId),
    /// Nothing matched; nothing changed.
    Absent,
}

/// Counts from a full dataset merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub categories: usize,
    pub transactions: usize,
    pub settings: bool,
}

/// The local category key for a peer transaction.
///
/// Resolved through `category_sync_id` when a local category carries that
/// sync id. Otherwise the raw `category_id` from the peer is kept, which
/// only points at the right row when both stores happen to agree.
pub fn resolve_category<S: RecordStore>(store: &S, remote: &Transaction) -> Option<LocalId> {
    if let Some(sync_id) = &remote.category_sync_id {
        if let Some(local) = store.categories().find_by_sync_id(sync_id) {
            return local.id;
        }
        tracing::debug!(
            transaction = %remote.sync_id,
            category = %sync_id,
            "category not found locally, keeping raw category id"
        );
    }
    remote.category_id
}

/// Upserts a transaction from the peer, attributing it to the peer.
pub fn upsert_transaction<S: RecordStore>(store: &mut S, remote: Transaction) -> Result<Applied, StoreError> {
    let category_id = resolve_category(store, &remote);
    let incoming = Transaction {
        id: None,
        category_id,
        origin: Origin::Peer,
        ..remote
    };

    match store.transactions().find_by_sync_id(&incoming.sync_id).and_then(|t| t.id) {
        Some(id) => {
            store.transactions_mut().update(id, |t| *t = incoming)?;
            Ok(Applied::Updated(id))
        }
        None => Ok(Applied::Inserted(store.transactions_mut().add(incoming)?)),
    }
}

/// Upserts a category from the peer.
pub fn upsert_category<S: RecordStore>(store: &mut S, remote: Category) -> Result<Applied, StoreError> {
    let incoming = Category { id: None, ..remote };
    match store.categories().find_by_sync_id(&incoming.sync_id).and_then(|c| c.id) {
        Some(id) => {
            store.categories_mut().update(id, |c| *c = incoming)?;
            Ok(Applied::Updated(id))
        }
        None => Ok(Applied::Inserted(store.categories_mut().add(incoming)?)),
    }
}

pub fn delete_transaction<S: RecordStore>(store: &mut S, sync_id: &SyncId) -> Result<Applied, StoreError> {
    match store.transactions().find_by_sync_id(sync_id).and_then(|t| t.id) {
        Some(id) => {
            store.transactions_mut().delete(id)?;
            Ok(Applied::Deleted(id))
        }
        None => Ok(Applied::Absent),
    }
}

/// The category that takes over transactions of a deleted category of the
/// same kind: a default named like "Other" when there is one, else any
/// default.
pub fn fallback_category<S: RecordStore>(store: &S, kind: TransactionKind, except: LocalId) -> Option<LocalId> {
    let defaults = || {
        store
            .categories()
            .iter()
            .filter(move |c| c.is_default && c.kind == kind && c.id != Some(except))
    };
    defaults()
        .find(|c| c.name.contains("Other"))
        .or_else(|| defaults().next())
        .and_then(|c| c.id)
}

/// Moves every transaction of category `from` onto `to`. Returns the moved
/// transactions as they are now stored.
pub fn reassign_transactions<S: RecordStore>(
    store: &mut S,
    from: LocalId,
    to: &Category,
) -> Result<Vec<Transaction>, StoreError> {
    let ids: Vec<LocalId> = store
        .transactions()
        .iter()
        .filter(|t| t.category_id == Some(from))
        .filter_map(|t| t.id)
        .collect();
    let mut moved = Vec::with_capacity(ids.len());
    for id in ids {
        store.transactions_mut().update(id, |t| {
            t.category_id = to.id;
            t.category_sync_id = Some(to.sync_id);
        })?;
        if let Some(t) = store.transactions().get(id) {
            moved.push(t.clone());
        }
    }
    Ok(moved)
}

/// Deletes a category by sync id, first moving its transactions onto the
/// fallback category when one exists.
pub fn delete_category<S: RecordStore>(store: &mut S, sync_id: &SyncId) -> Result<Applied, StoreError> {
    let Some(category) = store.categories().find_by_sync_id(sync_id).cloned() else {
        return Ok(Applied::Absent);
    };
    let Some(id) = category.id else {
        return Ok(Applied::Absent);
    };
    if let Some(fallback) = fallback_category(store, category.kind, id)
        .and_then(|fid| store.categories().get(fid).cloned())
    {
        reassign_transactions(store, id, &fallback)?;
    }
    store.categories_mut().delete(id)?;
    Ok(Applied::Deleted(id))
}

/// Takes the peer's currency and theme. Reminder preferences stay local.
pub fn merge_settings<S: RecordStore>(store: &mut S, remote: &Settings) -> Result<Applied, StoreError> {
    match store.settings().first().and_then(|s| s.id) {
        Some(id) => {
            store.settings_mut().update(id, |s| {
                s.currency = remote.currency.clone();
                s.theme = remote.theme;
            })?;
            Ok(Applied::Updated(id))
        }
        None => {
            let settings = Settings {
                id: None,
                ..remote.clone()
            };
            Ok(Applied::Inserted(store.settings_mut().add(settings)?))
        }
    }
}

/// Merges a whole peer dataset: categories first so transactions can
/// resolve their category references, then transactions, then settings.
pub fn merge_dataset<S: RecordStore>(store: &mut S, dataset: Dataset) -> Result<MergeSummary, StoreError> {
    let mut summary = MergeSummary::default();
    for category in dataset.categories {
        upsert_category(store, category)?;
        summary.categories += 1;
    }
    for transaction in dataset.transactions {
        upsert_transaction(store, transaction)?;
        summary.transactions += 1;
    }
    if let Some(settings) = &dataset.settings {
        merge_settings(store, settings)?;
        summary.settings = true;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn category(name: &str, is_default: bool) -> Category {
        Category {
            id: None,
            sync_id: SyncId::new(),
            name: name.into(),
            color: "#000000".into(),
            kind: TransactionKind::Expense,
            is_default,
        }
    }

    fn transaction(category: &Category, amount: f64) -> Transaction {
        Transaction {
            id: Some(LocalId(500)),
            sync_id: SyncId::new(),
            amount,
            category_id: Some(LocalId(77)),
            category_sync_id: Some(category.sync_id),
            date: "2024-06-01".into(),
            description: "Peer spend".into(),
            created_at: 5,
            modified_at: 5,
            kind: TransactionKind::Expense,
            origin: Origin::Local,
        }
    }

    #[test]
    fn test_insert_drops_remote_id_and_tags_peer() {
        let mut store = MemoryStore::new();
        let food = category("Food", false);
        let local_food = store.categories_mut().add(food.clone()).unwrap();
        let remote = transaction(&food, 10.0);

        let applied = upsert_transaction(&mut store, remote.clone()).unwrap();
        let Applied::Inserted(id) = applied else {
            panic!("expected insert, got {applied:?}");
        };
        let stored = store.transactions().get(id).unwrap();
        assert_ne!(stored.id, remote.id);
        assert_eq!(stored.category_id, Some(local_food));
        assert_eq!(stored.origin, Origin::Peer);
    }

    #[test]
    fn test_update_keeps_local_id() {
        let mut store = MemoryStore::new();
        let food = category("Food", false);
        store.categories_mut().add(food.clone()).unwrap();
        let mut remote = transaction(&food, 10.0);
        let Applied::Inserted(id) = upsert_transaction(&mut store, remote.clone()).unwrap() else {
            panic!("expected insert");
        };

        remote.amount = 25.0;
        remote.id = Some(LocalId(9));
        assert_eq!(upsert_transaction(&mut store, remote).unwrap(), Applied::Updated(id));
        assert_eq!(store.transactions().len(), 1);
        assert_eq!(store.transactions().get(id).unwrap().amount, 25.0);
    }

    #[test]
    fn test_unresolvable_category_keeps_raw_id() {
        let mut store = MemoryStore::new();
        let unknown = category("Unknown", false);
        let remote = transaction(&unknown, 1.0);
        let Applied::Inserted(id) = upsert_transaction(&mut store, remote).unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(store.transactions().get(id).unwrap().category_id, Some(LocalId(77)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = MemoryStore::new();
        let food = category("Food", false);
        store.categories_mut().add(food.clone()).unwrap();
        let remote = transaction(&food, 1.0);
        upsert_transaction(&mut store, remote.clone()).unwrap();

        assert!(matches!(delete_transaction(&mut store, &remote.sync_id), Ok(Applied::Deleted(_))));
        assert_eq!(delete_transaction(&mut store, &remote.sync_id), Ok(Applied::Absent));
        assert!(store.transactions().is_empty());
    }

    #[test]
    fn test_delete_category_moves_transactions_to_other() {
        let mut store = MemoryStore::new();
        let general = category("General", true);
        let other = category("Other Expenses", true);
        let coffee = category("Coffee", false);
        for c in [&general, &other, &coffee] {
            store.categories_mut().add(c.clone()).unwrap();
        }
        upsert_transaction(&mut store, transaction(&coffee, 3.0)).unwrap();

        assert!(matches!(delete_category(&mut store, &coffee.sync_id), Ok(Applied::Deleted(_))));
        let moved = store.transactions().first().unwrap();
        assert_eq!(moved.category_sync_id, Some(other.sync_id));
        assert_eq!(
            moved.category_id,
            store.categories().find_by_sync_id(&other.sync_id).unwrap().id
        );
        assert_eq!(delete_category(&mut store, &coffee.sync_id), Ok(Applied::Absent));
    }

    #[test]
    fn test_settings_merge_only_takes_currency_and_theme() {
        let mut store = MemoryStore::with_defaults(Vec::new()).unwrap();
        store
            .settings_mut()
            .update(LocalId(1), |s| {
                s.reminder_enabled = true;
                s.reminder_time = "07:30".into();
            })
            .unwrap();
        let remote = Settings {
            id: Some(LocalId(3)),
            currency: "EUR".into(),
            theme: crate::record::Theme::Dark,
            reminder_enabled: false,
            reminder_time: "22:00".into(),
        };
        assert_eq!(merge_settings(&mut store, &remote), Ok(Applied::Updated(LocalId(1))));
        let local = store.settings().first().unwrap();
        assert_eq!(local.currency, "EUR");
        assert_eq!(local.theme, crate::record::Theme::Dark);
        assert!(local.reminder_enabled);
        assert_eq!(local.reminder_time, "07:30");
    }

    #[test]
    fn test_merge_dataset_orders_categories_first() {
        let mut store = MemoryStore::new();
        // Occupy id 1 so the peer's category lands on a different local id.
        store.categories_mut().add(category("Mine", false)).unwrap();

        let groceries = Category {
            id: Some(LocalId(1)),
            ..category("Groceries", false)
        };
        let mut tx = transaction(&groceries, 10.0);
        tx.category_id = groceries.id;
        let dataset = Dataset {
            transactions: vec![tx],
            categories: vec![groceries.clone()],
            settings: Some(Settings::default()),
        };

        let summary = merge_dataset(&mut store, dataset).unwrap();
        assert_eq!(
            summary,
            MergeSummary {
                categories: 1,
                transactions: 1,
                settings: true,
            }
        );
        let local_groceries = store.categories().find_by_sync_id(&groceries.sync_id).unwrap();
        assert_eq!(local_groceries.id, Some(LocalId(2)));
        assert_eq!(store.transactions().first().unwrap().category_id, Some(LocalId(2)));
    }
}
