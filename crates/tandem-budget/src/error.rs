use crate::ids::LocalId;
use crate::store::StoreError;

/// Why a local budget action failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    #[error("category {0} not found")]
    CategoryNotFound(LocalId),

    #[error("transaction {0} not found")]
    TransactionNotFound(LocalId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
