use thiserror::Error;

use stockledger_core::{DomainError, Sku};

use crate::store::StoreError;
use crate::transaction::MovementKind;

/// Failure of a ledger or catalog operation.
///
/// Every variant except `Storage` is a caller-recoverable rejection that left
/// no state behind.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("product not found: {0}")]
    ProductNotFound(Sku),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("{0} cannot be requested as a stock movement")]
    InvalidMovement(MovementKind),

    #[error("insufficient stock for {sku}: on hand {on_hand}, requested {requested}")]
    InsufficientStock {
        sku: Sku,
        on_hand: i64,
        requested: i64,
    },

    #[error("product already exists: {0}")]
    DuplicateSku(Sku),

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    /// Whether the caller can surface this as a user-visible rejection.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }

    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Storage(StoreError::Concurrency(_)))
    }
}
