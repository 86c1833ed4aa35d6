//! SQLite-backed ledger store.
//!
//! Products and transactions live in two tables. Every write runs inside one
//! SQL transaction, and quantity writes are guarded by the product's `version`
//! column, so a stale writer updates zero rows and gets `StoreError::Concurrency`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SQLite code | StoreError |
//! |------------|-------------|------------|
//! | Database (unique / primary key) | `2067`, `1555` | `Duplicate` |
//! | Database (busy / locked) | `5`, `6`, `517` | `Concurrency` |
//! | Anything else | - | `Backend` |
//!
//! Timestamps are stored as microseconds since the Unix epoch so ordering is
//! plain integer ordering.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use stockledger_core::{Actor, ExpectedVersion, Money, Sku, TransactionId};
use stockledger_inventory::{
    LedgerStore, MovementKind, NewProduct, NewTransaction, Product, ProductDetails, StockPosition,
    StoreError, Transaction, TransactionQuery,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        sku           TEXT PRIMARY KEY NOT NULL,
        name          TEXT NOT NULL,
        category      TEXT NOT NULL,
        description   TEXT NULL,
        cost_price    INTEGER NOT NULL,
        selling_price INTEGER NOT NULL,
        min_quantity  INTEGER NOT NULL,
        image_ref     TEXT NULL,
        quantity      INTEGER NOT NULL,
        version       INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        occurred_at  INTEGER NOT NULL,
        sku          TEXT NOT NULL,
        product_name TEXT NOT NULL,
        kind         TEXT NOT NULL,
        delta        INTEGER NOT NULL,
        actor        TEXT NOT NULL,
        counterparty TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_sku_time
        ON transactions (sku, occurred_at DESC, id DESC)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_time
        ON transactions (occurred_at DESC, id DESC)
    "#,
];

const PRODUCT_COLUMNS: &str = "sku, name, category, description, cost_price, selling_price, \
                               min_quantity, image_ref, quantity, version";

const TRANSACTION_COLUMNS: &str =
    "id, occurred_at, sku, product_name, kind, delta, actor, counterparty";

/// Ledger store over a SQLite connection pool.
///
/// `Clone` is cheap: the pool is reference counted.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` databases are per connection, so they get a
    /// single-connection pool.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("parse_url", e))?
            .create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        debug!("sqlite schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip_all, fields(sku = %product.sku), err)]
    async fn insert_product(
        &self,
        product: NewProduct,
        opening: Option<NewTransaction>,
    ) -> Result<(Product, Option<Transaction>), StoreError> {
        let opening_quantity = opening.as_ref().map_or(0, |entry| entry.delta);
        let product = Product::created(product, opening_quantity);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let details = product.details();
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ))
        .bind(product.sku().as_str())
        .bind(&details.name)
        .bind(&details.category)
        .bind(details.description.as_deref())
        .bind(details.cost_price.minor())
        .bind(details.selling_price.minor())
        .bind(details.min_quantity)
        .bind(details.image_ref.as_deref())
        .bind(product.quantity())
        .bind(version_to_db(1))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        let opening = match opening {
            Some(entry) => Some(append(&mut tx, entry).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((product, opening))
    }

    #[instrument(skip(self, details), fields(sku = %sku), err)]
    async fn update_product(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        details: ProductDetails,
    ) -> Result<Product, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE products
            SET name = ?1, category = ?2, description = ?3, cost_price = ?4,
                selling_price = ?5, min_quantity = ?6, image_ref = ?7,
                version = version + 1
            WHERE sku = ?8 AND (?9 IS NULL OR version = ?9)
            "#,
        )
        .bind(&details.name)
        .bind(&details.category)
        .bind(details.description.as_deref())
        .bind(details.cost_price.minor())
        .bind(details.selling_price.minor())
        .bind(details.min_quantity)
        .bind(details.image_ref.as_deref())
        .bind(sku.as_str())
        .bind(expected_to_db(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?
        .rows_affected();

        if updated == 0 {
            return Err(missing_or_conflict(&mut tx, sku, expected_version).await);
        }

        let product = load_in(&mut tx, sku).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self, entry), fields(sku = %sku, delta = entry.delta), err)]
    async fn commit(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
        entry: NewTransaction,
    ) -> Result<(Product, Transaction), StoreError> {
        if &entry.sku != sku {
            return Err(StoreError::Backend(format!(
                "transaction for {} committed against {sku}",
                entry.sku
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if !set_quantity(&mut tx, sku, expected_version, new_quantity).await? {
            return Err(missing_or_conflict(&mut tx, sku, expected_version).await);
        }
        let committed = append(&mut tx, entry).await?;
        let product = load_in(&mut tx, sku).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((product, committed))
    }

    #[instrument(skip(self), fields(sku = %sku), err)]
    async fn overwrite_quantity(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
    ) -> Result<Product, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if !set_quantity(&mut tx, sku, expected_version, new_quantity).await? {
            return Err(missing_or_conflict(&mut tx, sku, expected_version).await);
        }
        let product = load_in(&mut tx, sku).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(sku = %sku), err)]
    async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let deleted = sqlx::query("DELETE FROM products WHERE sku = ?1")
            .bind(sku.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?
            .rows_affected();
        if deleted == 0 {
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM transactions WHERE sku = ?1")
            .bind(sku.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_transactions", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(removed))
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"
        ));
        if let Some(sku) = &query.sku {
            builder.push(" AND sku = ").push_bind(sku.as_str().to_string());
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(from) = query.occurred_after {
            builder
                .push(" AND occurred_at >= ")
                .push_bind(from.timestamp_micros());
        }
        if let Some(until) = query.occurred_before {
            builder
                .push(" AND occurred_at < ")
                .push_bind(until.timestamp_micros());
        }
        builder.push(" ORDER BY occurred_at DESC, id DESC");
        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("transactions", e))?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError> {
        // One statement reads from one snapshot.
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS}, \
                    (SELECT COALESCE(SUM(t.delta), 0) FROM transactions t WHERE t.sku = ?1) \
                    AS ledger_sum \
             FROM products WHERE sku = ?1"
        ))
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_position", e))?;

        row.as_ref()
            .map(|row| {
                Ok(StockPosition {
                    product: product_from_row(row)?,
                    ledger_sum: column(row, "ledger_sum")?,
                })
            })
            .transpose()
    }
}

type SqliteTx<'c> = sqlx::Transaction<'c, Sqlite>;

/// Version-guarded quantity write. False when no row matched.
async fn set_quantity(
    tx: &mut SqliteTx<'_>,
    sku: &Sku,
    expected_version: ExpectedVersion,
    new_quantity: i64,
) -> Result<bool, StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE products
        SET quantity = ?1, version = version + 1
        WHERE sku = ?2 AND (?3 IS NULL OR version = ?3)
        "#,
    )
    .bind(new_quantity)
    .bind(sku.as_str())
    .bind(expected_to_db(expected_version))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("set_quantity", e))?
    .rows_affected();
    Ok(updated > 0)
}

async fn append(tx: &mut SqliteTx<'_>, entry: NewTransaction) -> Result<Transaction, StoreError> {
    let id = sqlx::query(&format!(
        "INSERT INTO transactions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        "occurred_at, sku, product_name, kind, delta, actor, counterparty"
    ))
    .bind(entry.occurred_at.timestamp_micros())
    .bind(entry.sku.as_str())
    .bind(&entry.product_name)
    .bind(entry.kind.as_str())
    .bind(entry.delta)
    .bind(entry.actor.as_str())
    .bind(&entry.counterparty)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("append_transaction", e))?
    .last_insert_rowid();

    let id = u64::try_from(id)
        .map_err(|_| StoreError::Backend(format!("negative transaction id {id}")))?;
    Ok(entry.commit(TransactionId::new(id)))
}

async fn load_in(tx: &mut SqliteTx<'_>, sku: &Sku) -> Result<Product, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
    ))
    .bind(sku.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_product", e))?;
    product_from_row(&row)
}

/// Explain why a guarded write matched no row.
async fn missing_or_conflict(
    tx: &mut SqliteTx<'_>,
    sku: &Sku,
    expected_version: ExpectedVersion,
) -> StoreError {
    let current: Result<Option<i64>, _> =
        sqlx::query_scalar("SELECT version FROM products WHERE sku = ?1")
            .bind(sku.as_str())
            .fetch_optional(&mut **tx)
            .await;

    match current {
        Ok(None) => StoreError::NotFound(format!("product {sku}")),
        Ok(Some(found)) => StoreError::Concurrency(format!(
            "product {sku}: expected {expected_version:?}, found {found}"
        )),
        Err(e) => map_sqlx_error("check_version", e),
    }
}

fn expected_to_db(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(version_to_db(v)),
    }
}

fn version_to_db(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    let sku: String = column(row, "sku")?;
    let sku = Sku::new(&sku).map_err(|e| StoreError::Backend(format!("stored sku: {e}")))?;
    let details = ProductDetails {
        name: column(row, "name")?,
        category: column(row, "category")?,
        description: column(row, "description")?,
        cost_price: Money::from_minor(column(row, "cost_price")?),
        selling_price: Money::from_minor(column(row, "selling_price")?),
        min_quantity: column(row, "min_quantity")?,
        image_ref: column(row, "image_ref")?,
    };
    let version: i64 = column(row, "version")?;
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("negative version for {sku}")))?;

    Ok(Product::restore(sku, details, column(row, "quantity")?, version))
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let id: i64 = column(row, "id")?;
    let micros: i64 = column(row, "occurred_at")?;
    let sku: String = column(row, "sku")?;
    let kind: String = column(row, "kind")?;
    let actor: String = column(row, "actor")?;

    Ok(Transaction {
        id: TransactionId::new(
            u64::try_from(id).map_err(|_| StoreError::Backend(format!("negative id {id}")))?,
        ),
        occurred_at: DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {micros}")))?,
        sku: Sku::new(&sku).map_err(|e| StoreError::Backend(format!("stored sku: {e}")))?,
        product_name: column(row, "product_name")?,
        kind: MovementKind::from_str(&kind)
            .map_err(|e| StoreError::Backend(format!("stored kind: {e}")))?,
        delta: column(row, "delta")?,
        actor: Actor::new(&actor).map_err(|e| StoreError::Backend(format!("stored actor: {e}")))?,
        counterparty: column(row, "counterparty")?,
    })
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.is_unique_violation() {
                return StoreError::Duplicate(msg);
            }
            match db_err.code().as_deref() {
                Some("5" | "6" | "517") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("connection pool timed out in {operation}"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
