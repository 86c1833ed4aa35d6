//! Read-side figures computed from the ledger: profit report, dashboard
//! statistics, receipts. Nothing here mutates stock.

pub mod dashboard;
pub mod profit;
pub mod receipt;

pub use dashboard::{CategoryCount, DashboardStats, TopSeller, dashboard};
pub use profit::{ProfitLine, ProfitReport, ReportPeriod, profit_report};
pub use receipt::{CompanyProfile, Receipt, ReceiptError, receipt_for};
