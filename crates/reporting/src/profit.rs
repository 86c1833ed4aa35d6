use std::collections::HashMap;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, Money, Sku};
use stockledger_inventory::{
    LedgerError, LedgerStore, MovementKind, Product, StockLedger, Transaction, TransactionQuery,
};

/// Reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Today,
    #[default]
    Month,
    All,
}

impl ReportPeriod {
    /// Half-open `[from, until)` bounds of the window containing `today` (UTC).
    pub fn window(self, today: NaiveDate) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start_of = |day: NaiveDate| day.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        match self {
            ReportPeriod::All => (None, None),
            ReportPeriod::Today => (start_of(today), today.succ_opt().and_then(start_of)),
            ReportPeriod::Month => {
                let first = today.with_day(1);
                let next = first.and_then(|d| d.checked_add_months(Months::new(1)));
                (first.and_then(start_of), next.and_then(start_of))
            }
        }
    }
}

impl core::str::FromStr for ReportPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(ReportPeriod::Today),
            "month" => Ok(ReportPeriod::Month),
            "all" => Ok(ReportPeriod::All),
            other => Err(DomainError::validation(format!("unknown report period '{other}'"))),
        }
    }
}

/// One sale in the profit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLine {
    pub occurred_at: DateTime<Utc>,
    pub product_name: String,
    pub sku: Sku,
    pub units: i64,
    pub unit_cost: Money,
    pub unit_price: Money,
    pub sales: Money,
    pub profit: Money,
}

/// Sales, cost and profit of OUT movements in a window.
///
/// Priced with each product's *current* cost and selling price; sales of
/// products deleted since then are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitReport {
    pub period: ReportPeriod,
    /// Newest first.
    pub lines: Vec<ProfitLine>,
    pub total_sales: Money,
    pub total_cost: Money,
    pub total_profit: Money,
}

impl ProfitReport {
    /// Build from already-filtered transactions (non-OUT entries are ignored).
    pub fn build(period: ReportPeriod, transactions: &[Transaction], products: &[Product]) -> Self {
        let by_sku: HashMap<&Sku, &Product> = products.iter().map(|p| (p.sku(), p)).collect();

        let mut lines = Vec::new();
        let mut total_sales = Money::ZERO;
        let mut total_cost = Money::ZERO;

        for tx in transactions.iter().filter(|t| t.kind == MovementKind::Out) {
            let Some(product) = by_sku.get(&tx.sku) else {
                continue;
            };
            let units = tx.units();
            let sales = product.selling_price().times(units);
            let cost = product.cost_price().times(units);
            total_sales += sales;
            total_cost += cost;

            lines.push(ProfitLine {
                occurred_at: tx.occurred_at,
                product_name: product.name().to_string(),
                sku: tx.sku.clone(),
                units,
                unit_cost: product.cost_price(),
                unit_price: product.selling_price(),
                sales,
                profit: sales - cost,
            });
        }

        lines.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        Self {
            period,
            lines,
            total_sales,
            total_cost,
            total_profit: total_sales - total_cost,
        }
    }
}

/// Profit report for the window containing `today`, read through the ledger.
#[tracing::instrument(skip(ledger))]
pub async fn profit_report<S>(
    ledger: &StockLedger<S>,
    period: ReportPeriod,
    today: NaiveDate,
) -> Result<ProfitReport, LedgerError>
where
    S: LedgerStore,
{
    let (from, until) = period.window(today);
    let query = TransactionQuery::default()
        .of_kind(MovementKind::Out)
        .between(from, until);

    let transactions = ledger.transactions(&query).await?;
    let products = ledger.list_products().await?;
    Ok(ProfitReport::build(period, &transactions, &products))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_core::{Actor, TransactionId};
    use stockledger_inventory::{NewProduct, NewTransaction, ProductDetails};

    fn product(sku: &str, cost: i64, price: i64) -> Product {
        let details = ProductDetails::named(sku)
            .with_prices(Money::from_minor(cost), Money::from_minor(price));
        Product::created(NewProduct::new(Sku::new(sku).unwrap(), details), 100)
    }

    fn tx(id: u64, sku: &str, kind: MovementKind, delta: i64, hour: u32) -> Transaction {
        NewTransaction {
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap(),
            sku: Sku::new(sku).unwrap(),
            product_name: sku.to_string(),
            kind,
            delta,
            actor: Actor::new("staff").unwrap(),
            counterparty: "Customer1".to_string(),
        }
        .commit(TransactionId::new(id))
    }

    #[test]
    fn today_window_covers_one_day() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let (from, until) = ReportPeriod::Today.window(day);
        assert_eq!(from, Some(Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap()));
        assert_eq!(until, Some(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()));
    }

    #[test]
    fn month_window_rolls_over_year_end() {
        let day = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let (from, until) = ReportPeriod::Month.window(day);
        assert_eq!(from, Some(Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()));
        assert_eq!(until, Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn all_window_is_unbounded() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(ReportPeriod::All.window(day), (None, None));
    }

    #[test]
    fn period_parses_and_defaults_to_month() {
        assert_eq!("TODAY".parse::<ReportPeriod>().unwrap(), ReportPeriod::Today);
        assert!("week".parse::<ReportPeriod>().is_err());
        assert_eq!(ReportPeriod::default(), ReportPeriod::Month);
    }

    #[test]
    fn report_prices_out_movements_with_current_prices() {
        let products = vec![product("A", 60, 100), product("B", 10, 25)];
        let transactions = vec![
            tx(1, "A", MovementKind::Out, -2, 9),
            tx(2, "B", MovementKind::Out, -4, 10),
            tx(3, "A", MovementKind::In, 10, 11),
        ];

        let report = ProfitReport::build(ReportPeriod::All, &transactions, &products);

        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.lines[0].sku.as_str(), "B");
        assert_eq!(report.total_sales, Money::from_minor(2 * 100 + 4 * 25));
        assert_eq!(report.total_cost, Money::from_minor(2 * 60 + 4 * 10));
        assert_eq!(report.total_profit, Money::from_minor(80 + 60));
        assert_eq!(report.lines[1].profit, Money::from_minor(80));
    }

    #[test]
    fn sales_of_deleted_products_drop_out() {
        let transactions = vec![tx(1, "GONE", MovementKind::Out, -1, 9)];
        let report = ProfitReport::build(ReportPeriod::All, &transactions, &[]);
        assert!(report.lines.is_empty());
        assert_eq!(report.total_profit, Money::ZERO);
    }
}
