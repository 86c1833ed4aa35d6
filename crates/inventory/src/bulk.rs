//! Row shapes exchanged with spreadsheet import/export jobs.
//!
//! Decoding and writing the spreadsheet itself is the caller's job; these
//! types only fix the column set and the validation applied to each row.

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Money, Sku};

use crate::product::{DEFAULT_CATEGORY, DEFAULT_MIN_QUANTITY, NewProduct, Product, ProductDetails};

/// One decoded import row. Column names match the exported sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
    #[serde(rename = "Cost", default)]
    pub cost: Money,
    #[serde(rename = "Price", default)]
    pub price: Money,
    #[serde(rename = "Qty", default)]
    pub quantity: i64,
}

impl ImportRow {
    /// Validate the row and split it into a product and its opening quantity.
    pub fn into_new_product(self) -> DomainResult<(NewProduct, i64)> {
        let sku = Sku::new(&self.sku)?;
        if self.quantity < 0 {
            return Err(DomainError::validation(format!(
                "opening quantity cannot be negative, got {}",
                self.quantity
            )));
        }

        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let details = ProductDetails {
            name: self.name.trim().to_string(),
            category,
            description: None,
            cost_price: self.cost,
            selling_price: self.price,
            min_quantity: DEFAULT_MIN_QUANTITY,
            image_ref: None,
        };
        details.validate()?;

        Ok((NewProduct::new(sku, details), self.quantity))
    }
}

/// A row the import refused, with its 1-based position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row: usize,
    pub reason: String,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: Vec<Sku>,
    /// SKUs already present in the catalog (left untouched).
    pub skipped: Vec<Sku>,
    pub rejected: Vec<RowRejection>,
    /// Number of IMPORT transactions recorded for opening stock.
    pub opening_transactions: usize,
}

impl ImportSummary {
    pub(crate) fn reject(&mut self, row: usize, reason: String) {
        self.rejected.push(RowRejection { row, reason });
    }
}

/// One exported catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "SKU")]
    pub sku: Sku,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Cost")]
    pub cost: Money,
    #[serde(rename = "Price")]
    pub price: Money,
    #[serde(rename = "Qty")]
    pub quantity: i64,
    #[serde(rename = "MinQty")]
    pub min_quantity: i64,
}

impl From<&Product> for ExportRow {
    fn from(product: &Product) -> Self {
        Self {
            sku: product.sku().clone(),
            name: product.name().to_string(),
            category: product.category().to_string(),
            cost: product.cost_price(),
            price: product.selling_price(),
            quantity: product.quantity(),
            min_quantity: product.min_quantity(),
        }
    }
}
