//! Storage boundary for products and the transaction log.
//!
//! The ledger never touches a database directly. It reads a product, decides a
//! change, and hands the store a quantity write plus the transaction that
//! justifies it. The store must make those two effects atomic and must reject
//! the write if the product's version moved since it was read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ExpectedVersion, Sku};

use crate::product::{NewProduct, Product, ProductDetails};
use crate::transaction::{MovementKind, NewTransaction, Transaction};

/// Storage operation error.
///
/// Infrastructure failures and write conflicts; business rejections live in
/// `LedgerError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filter for reads of the transaction log.
///
/// Every field is optional; an empty query selects the whole log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub sku: Option<Sku>,
    pub kind: Option<MovementKind>,
    /// Inclusive lower bound.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub occurred_before: Option<DateTime<Utc>>,
    /// Keep only the newest `limit` matches.
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn for_sku(sku: Sku) -> Self {
        Self {
            sku: Some(sku),
            ..Self::default()
        }
    }

    pub fn of_kind(mut self, kind: MovementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.occurred_after = from;
        self.occurred_before = until;
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Row-level predicate (the limit is applied by the caller after sorting).
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.sku.as_ref().is_none_or(|sku| &tx.sku == sku)
            && self.kind.is_none_or(|kind| tx.kind == kind)
            && self.occurred_after.is_none_or(|from| tx.occurred_at >= from)
            && self.occurred_before.is_none_or(|until| tx.occurred_at < until)
    }
}

/// A product and the sum of its recorded deltas, read as one snapshot.
#[derive(Debug, Clone)]
pub struct StockPosition {
    pub product: Product,
    pub ledger_sum: i64,
}

/// Persistence for products and their append-only transaction log.
///
/// Implementations must:
/// - bump a product's version on every committed write
/// - reject writes whose `ExpectedVersion` does not match with `StoreError::Concurrency`
/// - persist a quantity write and its transaction atomically (both or neither)
/// - assign strictly increasing transaction ids
/// - return transactions newest first (timestamp, then id)
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load one product (None if unknown).
    async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError>;

    /// All products, ordered by SKU.
    async fn products(&self) -> Result<Vec<Product>, StoreError>;

    /// Insert a new product, optionally with its opening transaction.
    ///
    /// The product's quantity starts at the opening delta (or 0). Fails with
    /// `StoreError::Duplicate` if the SKU exists.
    async fn insert_product(
        &self,
        product: NewProduct,
        opening: Option<NewTransaction>,
    ) -> Result<(Product, Option<Transaction>), StoreError>;

    /// Replace a product's editable details. Quantity is untouched.
    async fn update_product(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        details: ProductDetails,
    ) -> Result<Product, StoreError>;

    /// Set a product's quantity and append the transaction explaining it, atomically.
    async fn commit(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
        entry: NewTransaction,
    ) -> Result<(Product, Transaction), StoreError>;

    /// Set a product's quantity without appending anything (integrity repair only).
    async fn overwrite_quantity(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
    ) -> Result<Product, StoreError>;

    /// Delete a product and every transaction recorded under its SKU.
    ///
    /// Returns the number of transactions removed, or None if the product did not exist.
    async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError>;

    /// Read the log, newest first.
    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError>;

    /// Load a product together with its ledger sum in one atomic read, so no
    /// write can land between the two (None if unknown).
    async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError> {
        (**self).product(sku).await
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).products().await
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        opening: Option<NewTransaction>,
    ) -> Result<(Product, Option<Transaction>), StoreError> {
        (**self).insert_product(product, opening).await
    }

    async fn update_product(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        details: ProductDetails,
    ) -> Result<Product, StoreError> {
        (**self).update_product(sku, expected_version, details).await
    }

    async fn commit(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
        entry: NewTransaction,
    ) -> Result<(Product, Transaction), StoreError> {
        (**self).commit(sku, expected_version, new_quantity, entry).await
    }

    async fn overwrite_quantity(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
    ) -> Result<Product, StoreError> {
        (**self).overwrite_quantity(sku, expected_version, new_quantity).await
    }

    async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError> {
        (**self).delete_product(sku).await
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions(query).await
    }

    async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError> {
        (**self).stock_position(sku).await
    }
}
