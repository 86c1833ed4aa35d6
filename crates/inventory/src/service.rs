//! `StockLedger`: the only entry point that mutates product quantity.
//!
//! Every mutation follows the same loop:
//!
//! ```text
//! load product (with version)
//!   ↓
//! decide change (pure, see `ledger`)
//!   ↓
//! commit quantity + transaction against the version read
//!   ↓ conflict?
//! re-load and re-decide (bounded by `max_conflict_retries`)
//! ```
//!
//! Two concurrent OUT requests on one SKU therefore cannot both pass the stock
//! check against the same stale quantity: the second commit fails its version
//! check and re-decides against the fresh quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stockledger_core::{Actor, AggregateRoot, ExpectedVersion, Sku};

use crate::bulk::{ExportRow, ImportRow, ImportSummary};
use crate::error::LedgerError;
use crate::ledger::{self, Reconciliation, StockChange};
use crate::product::{NewProduct, Product, ProductDetails};
use crate::store::{LedgerStore, StockPosition, StoreError, TransactionQuery};
use crate::transaction::{History, MovementKind, NewTransaction, Transaction};

/// Counterparty recorded when a movement names none.
pub const DEFAULT_COUNTERPARTY: &str = "-";

/// Reason recorded when an adjustment names none.
pub const DEFAULT_ADJUST_REASON: &str = "Audit";

/// Ledger tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Extra attempts after a version conflict before giving up.
    pub max_conflict_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 8,
        }
    }
}

/// Request: receive (IN) or dispatch (OUT) stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub sku: Sku,
    pub kind: MovementKind,
    pub quantity: i64,
    pub actor: Actor,
    pub counterparty: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Request: correct stock to a physically counted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustToActual {
    pub sku: Sku,
    pub actual_quantity: i64,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

fn label_or(label: &Option<String>, default: &str) -> String {
    match label.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

/// Stock ledger over an injected store.
#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> StockLedger<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    fn should_retry(&self, err: &LedgerError, attempt: u32, sku: &Sku) -> bool {
        if err.is_conflict() && attempt < self.config.max_conflict_retries {
            debug!(sku = %sku, attempt = attempt + 1, "version conflict; retrying");
            return true;
        }
        false
    }

    async fn load(&self, sku: &Sku) -> Result<Product, LedgerError> {
        self.store
            .product(sku)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(sku.clone()))
    }

    async fn commit_change(
        &self,
        product: &Product,
        change: StockChange,
        actor: &Actor,
        counterparty: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let entry = NewTransaction {
            occurred_at,
            sku: product.sku().clone(),
            product_name: product.name().to_string(),
            kind: change.kind,
            delta: change.delta,
            actor: actor.clone(),
            counterparty,
        };

        let (_, committed) = self
            .store
            .commit(
                product.sku(),
                ExpectedVersion::Exact(product.version()),
                change.new_quantity,
                entry,
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => LedgerError::ProductNotFound(product.sku().clone()),
                other => LedgerError::Storage(other),
            })?;

        Ok(committed)
    }

    /// Receive or dispatch stock.
    #[tracing::instrument(
        skip(self, cmd),
        fields(sku = %cmd.sku, kind = %cmd.kind, quantity = cmd.quantity, actor = %cmd.actor)
    )]
    pub async fn apply_movement(&self, cmd: RecordMovement) -> Result<Transaction, LedgerError> {
        let counterparty = label_or(&cmd.counterparty, DEFAULT_COUNTERPARTY);
        let mut attempt = 0;
        loop {
            let result = async {
                let product = self.load(&cmd.sku).await?;
                let change = ledger::plan_movement(&product, cmd.kind, cmd.quantity)?;
                self.commit_change(&product, change, &cmd.actor, counterparty.clone(), cmd.occurred_at)
                    .await
            }
            .await;

            match result {
                Err(err) if self.should_retry(&err, attempt, &cmd.sku) => attempt += 1,
                Err(err) => {
                    if let LedgerError::InsufficientStock { on_hand, requested, .. } = &err {
                        warn!(on_hand, requested, "movement rejected: insufficient stock");
                    }
                    return Err(err);
                }
                Ok(tx) => {
                    info!(transaction_id = %tx.id, delta = tx.delta, "stock movement recorded");
                    return Ok(tx);
                }
            }
        }
    }

    /// Correct stock to a counted value. Returns None when nothing changed.
    #[tracing::instrument(
        skip(self, cmd),
        fields(sku = %cmd.sku, actual = cmd.actual_quantity, actor = %cmd.actor)
    )]
    pub async fn adjust_to_actual(
        &self,
        cmd: AdjustToActual,
    ) -> Result<Option<Transaction>, LedgerError> {
        let reason = label_or(&cmd.reason, DEFAULT_ADJUST_REASON);
        let mut attempt = 0;
        loop {
            let result = async {
                let product = self.load(&cmd.sku).await?;
                match ledger::plan_adjustment(&product, cmd.actual_quantity)? {
                    None => Ok::<_, LedgerError>(None),
                    Some(change) => self
                        .commit_change(&product, change, &cmd.actor, reason.clone(), cmd.occurred_at)
                        .await
                        .map(Some),
                }
            }
            .await;

            match result {
                Err(err) if self.should_retry(&err, attempt, &cmd.sku) => attempt += 1,
                Err(err) => return Err(err),
                Ok(Some(tx)) => {
                    info!(transaction_id = %tx.id, delta = tx.delta, "stock adjusted");
                    return Ok(Some(tx));
                }
                Ok(None) => {
                    debug!("count matches stored quantity; nothing recorded");
                    return Ok(None);
                }
            }
        }
    }

    /// Transactions recorded under `sku`, newest first.
    ///
    /// An unknown or deleted SKU simply has no history.
    pub async fn history_for(&self, sku: &Sku) -> Result<History, LedgerError> {
        let entries = self
            .store
            .transactions(&TransactionQuery::for_sku(sku.clone()))
            .await?;
        Ok(History::new(entries))
    }

    /// The newest `limit` transactions across all products.
    pub async fn recent_history(&self, limit: usize) -> Result<History, LedgerError> {
        let entries = self
            .store
            .transactions(&TransactionQuery::default().limited(limit))
            .await?;
        Ok(History::new(entries))
    }

    pub async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions(query).await?)
    }

    async fn load_position(&self, sku: &Sku) -> Result<StockPosition, LedgerError> {
        self.store
            .stock_position(sku)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(sku.clone()))
    }

    /// Stored quantity vs. history for one product, read as one snapshot.
    pub async fn reconciliation(&self, sku: &Sku) -> Result<Reconciliation, LedgerError> {
        let position = self.load_position(sku).await?;
        Ok(Reconciliation::of_position(&position))
    }

    /// Whether the stored quantity equals the sum of recorded deltas.
    pub async fn reconcile(&self, sku: &Sku) -> Result<bool, LedgerError> {
        let check = self.reconciliation(sku).await?;
        if !check.is_consistent() {
            warn!(
                sku = %sku,
                stored = check.stored,
                ledger_sum = check.ledger_sum,
                "stored quantity disagrees with ledger"
            );
        }
        Ok(check.is_consistent())
    }

    /// Reset the stored quantity to the ledger sum.
    ///
    /// Returns the reconciliation observed before the repair. History is never
    /// touched.
    #[tracing::instrument(skip(self, sku), fields(sku = %sku))]
    pub async fn repair(&self, sku: &Sku) -> Result<Reconciliation, LedgerError> {
        let mut attempt = 0;
        loop {
            let result = async {
                let position = self.load_position(sku).await?;
                let check = Reconciliation::of_position(&position);
                if !check.is_consistent() {
                    self.store
                        .overwrite_quantity(
                            sku,
                            ExpectedVersion::Exact(position.product.version()),
                            check.ledger_sum,
                        )
                        .await?;
                }
                Ok::<_, LedgerError>(check)
            }
            .await;

            match result {
                Err(err) if self.should_retry(&err, attempt, sku) => attempt += 1,
                Err(err) => return Err(err),
                Ok(check) => {
                    if !check.is_consistent() {
                        warn!(
                            stored = check.stored,
                            ledger_sum = check.ledger_sum,
                            "stored quantity reset to ledger sum"
                        );
                    }
                    return Ok(check);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────

    pub async fn product(&self, sku: &Sku) -> Result<Product, LedgerError> {
        self.load(sku).await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, LedgerError> {
        Ok(self.store.products().await?)
    }

    /// Products whose name or SKU contains `needle` (case-insensitive).
    pub async fn search_products(&self, needle: &str) -> Result<Vec<Product>, LedgerError> {
        let mut products = self.store.products().await?;
        products.retain(|p| p.matches_search(needle));
        Ok(products)
    }

    /// Add a product with zero stock.
    #[tracing::instrument(skip(self, new), fields(sku = %new.sku))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, LedgerError> {
        new.details.validate()?;
        let sku = new.sku.clone();
        let (product, _) = self
            .store
            .insert_product(new, None)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => LedgerError::DuplicateSku(sku),
                other => LedgerError::Storage(other),
            })?;
        info!("product created");
        Ok(product)
    }

    /// Edit a product's details. Quantity and SKU never change here.
    #[tracing::instrument(skip(self, sku, details), fields(sku = %sku))]
    pub async fn update_product(
        &self,
        sku: &Sku,
        details: ProductDetails,
    ) -> Result<Product, LedgerError> {
        details.validate()?;
        let mut attempt = 0;
        loop {
            let result = async {
                let current = self.load(sku).await?;
                self.store
                    .update_product(sku, ExpectedVersion::Exact(current.version()), details.clone())
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound(_) => LedgerError::ProductNotFound(sku.clone()),
                        other => LedgerError::Storage(other),
                    })
            }
            .await;

            match result {
                Err(err) if self.should_retry(&err, attempt, sku) => attempt += 1,
                other => return other,
            }
        }
    }

    /// Delete a product and its transactions. Returns how many transactions went with it.
    #[tracing::instrument(skip(self, sku), fields(sku = %sku))]
    pub async fn delete_product(&self, sku: &Sku) -> Result<u64, LedgerError> {
        match self.store.delete_product(sku).await? {
            Some(removed) => {
                info!(removed_transactions = removed, "product deleted");
                Ok(removed)
            }
            None => Err(LedgerError::ProductNotFound(sku.clone())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bulk import / export
    // ─────────────────────────────────────────────────────────────────────

    /// Create products from decoded spreadsheet rows.
    ///
    /// Existing SKUs are skipped. Opening stock is recorded as an IMPORT
    /// transaction in the same atomic unit as the product insert. A bad row is
    /// reported and does not stop the batch; a storage failure does.
    #[tracing::instrument(skip(self, rows, actor), fields(rows = rows.len(), actor = %actor))]
    pub async fn import_catalog(
        &self,
        rows: Vec<ImportRow>,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<ImportSummary, LedgerError> {
        let mut summary = ImportSummary::default();

        for (index, row) in rows.into_iter().enumerate() {
            let line = index + 1;
            let (new, opening_quantity) = match row.into_new_product() {
                Ok(parsed) => parsed,
                Err(err) => {
                    summary.reject(line, err.to_string());
                    continue;
                }
            };

            if self.store.product(&new.sku).await?.is_some() {
                summary.skipped.push(new.sku);
                continue;
            }

            let opening = (opening_quantity > 0).then(|| NewTransaction {
                occurred_at,
                sku: new.sku.clone(),
                product_name: new.details.name.clone(),
                kind: MovementKind::Import,
                delta: opening_quantity,
                actor: actor.clone(),
                counterparty: "Import".to_string(),
            });

            let sku = new.sku.clone();
            match self.store.insert_product(new, opening).await {
                Ok((_, opening_tx)) => {
                    if opening_tx.is_some() {
                        summary.opening_transactions += 1;
                    }
                    summary.created.push(sku);
                }
                Err(StoreError::Duplicate(_)) => summary.skipped.push(sku),
                Err(other) => return Err(LedgerError::Storage(other)),
            }
        }

        info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            rejected = summary.rejected.len(),
            "catalog import finished"
        );
        Ok(summary)
    }

    /// Current catalog as flat rows for a spreadsheet writer.
    pub async fn export_catalog(&self) -> Result<Vec<ExportRow>, LedgerError> {
        let products = self.store.products().await?;
        Ok(products.iter().map(ExportRow::from).collect())
    }
}
