//! Inventory domain module: product catalog and the stock ledger.
//!
//! A product's cached quantity always equals the sum of the signed deltas in
//! its transaction log, and every quantity write is paired atomically with the
//! transaction explaining it. Decisions are pure (`ledger`); persistence sits
//! behind `LedgerStore`; `StockLedger` composes the two.

pub mod bulk;
pub mod error;
pub mod ledger;
pub mod product;
pub mod service;
pub mod store;
pub mod transaction;

pub use bulk::{ExportRow, ImportRow, ImportSummary, RowRejection};
pub use error::LedgerError;
pub use ledger::{Reconciliation, StockChange, parse_quantity};
pub use product::{NewProduct, Product, ProductDetails};
pub use service::{AdjustToActual, LedgerConfig, RecordMovement, StockLedger};
pub use store::{LedgerStore, StockPosition, StoreError, TransactionQuery};
pub use transaction::{History, MovementKind, NewTransaction, Transaction, newest_first};
