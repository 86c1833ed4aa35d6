//! Pure stock decisions: given a product's current state, what change does a
//! request produce? No IO; the service commits whatever these functions return.

use serde::{Deserialize, Serialize};

use stockledger_core::Sku;

use crate::error::LedgerError;
use crate::product::Product;
use crate::store::StockPosition;
use crate::transaction::{MovementKind, Transaction};

/// A decided quantity change, not yet committed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub kind: MovementKind,
    pub delta: i64,
    pub new_quantity: i64,
}

/// Decode a quantity typed into a form. Surrounding whitespace is ignored.
pub fn parse_quantity(input: &str) -> Result<i64, LedgerError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| LedgerError::invalid_quantity(format!("'{}' is not a whole number", input.trim())))
}

/// Decide an IN or OUT movement of `quantity` units.
///
/// OUT never clamps: requesting more than is on hand rejects the whole movement.
pub fn plan_movement(
    product: &Product,
    kind: MovementKind,
    quantity: i64,
) -> Result<StockChange, LedgerError> {
    if !kind.is_movement() {
        return Err(LedgerError::InvalidMovement(kind));
    }
    if quantity <= 0 {
        return Err(LedgerError::invalid_quantity(format!(
            "quantity must be positive, got {quantity}"
        )));
    }

    let on_hand = product.quantity();
    let (delta, new_quantity) = match kind {
        MovementKind::Out => {
            if on_hand < quantity {
                return Err(LedgerError::InsufficientStock {
                    sku: product.sku().clone(),
                    on_hand,
                    requested: quantity,
                });
            }
            (-quantity, on_hand - quantity)
        }
        _ => {
            let new_quantity = on_hand
                .checked_add(quantity)
                .ok_or_else(|| LedgerError::invalid_quantity("quantity overflows stock counter"))?;
            (quantity, new_quantity)
        }
    };

    Ok(StockChange {
        kind,
        delta,
        new_quantity,
    })
}

/// Decide a correction to a physically counted quantity.
///
/// Returns `None` when the count already matches (nothing worth auditing).
pub fn plan_adjustment(product: &Product, actual: i64) -> Result<Option<StockChange>, LedgerError> {
    if actual < 0 {
        return Err(LedgerError::invalid_quantity(format!(
            "counted quantity cannot be negative, got {actual}"
        )));
    }

    let delta = actual - product.quantity();
    if delta == 0 {
        return Ok(None);
    }

    Ok(Some(StockChange {
        kind: MovementKind::Adjust,
        delta,
        new_quantity: actual,
    }))
}

/// Sum of signed deltas: the quantity the history says should be on hand.
pub fn ledger_sum<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> i64 {
    transactions.into_iter().map(|t| t.delta).sum()
}

/// Stored quantity vs. the quantity implied by history, for one SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub sku: Sku,
    pub stored: i64,
    pub ledger_sum: i64,
}

impl Reconciliation {
    pub fn of<'a>(product: &Product, transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        Self {
            sku: product.sku().clone(),
            stored: product.quantity(),
            ledger_sum: ledger_sum(transactions),
        }
    }

    pub fn of_position(position: &StockPosition) -> Self {
        Self {
            sku: position.product.sku().clone(),
            stored: position.product.quantity(),
            ledger_sum: position.ledger_sum,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.stored == self.ledger_sum
    }

    /// How far the stored quantity is above (+) or below (-) the history.
    pub fn discrepancy(&self) -> i64 {
        self.stored - self.ledger_sum
    }
}
