use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use stockledger_core::Sku;
use stockledger_inventory::{
    LedgerError, LedgerStore, MovementKind, Product, StockLedger, Transaction, TransactionQuery,
};

/// How many best sellers the dashboard shows.
pub const TOP_SELLERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub products: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSeller {
    pub sku: Sku,
    pub name: String,
    pub units_sold: i64,
}

/// Headline figures for the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_products: usize,
    /// Products below their own reorder threshold.
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub total_quantity: i64,
    /// Sorted by category name.
    pub categories: Vec<CategoryCount>,
    pub top_sellers: Vec<TopSeller>,
}

impl DashboardStats {
    pub fn compute(products: &[Product], transactions: &[Transaction]) -> Self {
        let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
        for product in products {
            *categories.entry(product.category()).or_default() += 1;
        }

        let mut sold: HashMap<&Sku, (String, i64)> = HashMap::new();
        for tx in transactions.iter().filter(|t| t.kind == MovementKind::Out) {
            let entry = sold
                .entry(&tx.sku)
                .or_insert_with(|| (tx.product_name.clone(), 0));
            entry.1 += tx.units();
        }
        // Prefer the current name over the snapshot when the product still exists.
        for product in products {
            if let Some(entry) = sold.get_mut(product.sku()) {
                entry.0 = product.name().to_string();
            }
        }

        let mut top_sellers: Vec<TopSeller> = sold
            .into_iter()
            .map(|(sku, (name, units_sold))| TopSeller {
                sku: sku.clone(),
                name,
                units_sold,
            })
            .collect();
        top_sellers.sort_by(|a, b| {
            b.units_sold
                .cmp(&a.units_sold)
                .then_with(|| a.name.cmp(&b.name))
        });
        top_sellers.truncate(TOP_SELLERS);

        Self {
            total_products: products.len(),
            low_stock: products.iter().filter(|p| p.is_low_stock()).count(),
            out_of_stock: products.iter().filter(|p| p.is_out_of_stock()).count(),
            total_quantity: products.iter().map(Product::quantity).sum(),
            categories: categories
                .into_iter()
                .map(|(category, count)| CategoryCount {
                    category: category.to_string(),
                    products: count,
                })
                .collect(),
            top_sellers,
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn dashboard<S>(ledger: &StockLedger<S>) -> Result<DashboardStats, LedgerError>
where
    S: LedgerStore,
{
    let products = ledger.list_products().await?;
    let sales = ledger
        .transactions(&TransactionQuery::default().of_kind(MovementKind::Out))
        .await?;
    Ok(DashboardStats::compute(&products, &sales))
}
