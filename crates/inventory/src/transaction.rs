use core::cmp::Ordering;
use core::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Actor, DomainError, Sku, TransactionId};

/// Kind of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    /// Stock received (delta = +quantity).
    In,
    /// Stock dispatched (delta = -quantity).
    Out,
    /// Correction to a physically counted value (delta = counted - on hand).
    Adjust,
    /// Opening stock recorded when a product is created from an import row.
    Import,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Adjust => "ADJUST",
            MovementKind::Import => "IMPORT",
        }
    }

    /// IN and OUT are the only kinds a caller may request directly.
    pub fn is_movement(self) -> bool {
        matches!(self, MovementKind::In | MovementKind::Out)
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            "ADJUST" => Ok(MovementKind::Adjust),
            "IMPORT" => Ok(MovementKind::Import),
            other => Err(DomainError::validation(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

/// A transaction ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub occurred_at: DateTime<Utc>,
    pub sku: Sku,
    /// Product name at the time of the movement.
    pub product_name: String,
    pub kind: MovementKind,
    /// Signed change applied to the product's quantity.
    pub delta: i64,
    pub actor: Actor,
    /// Customer, supplier, or adjustment reason.
    pub counterparty: String,
}

impl NewTransaction {
    pub fn commit(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            occurred_at: self.occurred_at,
            sku: self.sku,
            product_name: self.product_name,
            kind: self.kind,
            delta: self.delta,
            actor: self.actor,
            counterparty: self.counterparty,
        }
    }
}

/// An appended, immutable ledger record.
///
/// SKU and product name are snapshots, so the record survives renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub occurred_at: DateTime<Utc>,
    pub sku: Sku,
    pub product_name: String,
    pub kind: MovementKind,
    pub delta: i64,
    pub actor: Actor,
    pub counterparty: String,
}

impl Transaction {
    /// Number of units moved, regardless of direction.
    pub fn units(&self) -> i64 {
        self.delta.abs()
    }
}

/// Ordering used for every history read: timestamp descending, then id descending.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.occurred_at
        .cmp(&a.occurred_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Read-only, newest-first view of ledger transactions.
///
/// Cheap to clone and can be iterated any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct History {
    entries: Arc<[Transaction]>,
}

impl History {
    /// Wrap transactions, sorting them newest first.
    pub fn new(mut entries: Vec<Transaction>) -> Self {
        entries.sort_by(newest_first);
        Self {
            entries: entries.into(),
        }
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Transaction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Transaction> {
        self.entries.first()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Transaction;
    type IntoIter = core::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
