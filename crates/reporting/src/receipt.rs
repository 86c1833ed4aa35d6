use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{DomainError, DomainResult, Money};
use stockledger_inventory::{LedgerError, LedgerStore, MovementKind, Product, StockLedger, Transaction};
use stockledger_parties::{Party, PartyDirectory, PartyError, PartyKind};

/// Seller details printed on receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyProfile {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub tax_id: String,
    /// VAT in whole percent.
    pub vat_rate: i64,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            name: "Inventory".to_string(),
            address: String::new(),
            phone: String::new(),
            tax_id: String::new(),
            vat_rate: 7,
        }
    }
}

impl CompanyProfile {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }
        if !(0..=100).contains(&self.vat_rate) {
            return Err(DomainError::validation(format!(
                "vat_rate must be between 0 and 100, got {}",
                self.vat_rate
            )));
        }
        Ok(())
    }
}

/// Printable receipt for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction: Transaction,
    /// None when the product has been deleted since.
    pub product: Option<Product>,
    /// Only looked up for OUT transactions, by counterparty name.
    pub customer: Option<Party>,
    pub company: CompanyProfile,
    pub line_total: Money,
    pub vat: Money,
    pub grand_total: Money,
}

impl Receipt {
    pub fn assemble(
        transaction: Transaction,
        product: Option<Product>,
        customer: Option<Party>,
        company: CompanyProfile,
    ) -> Self {
        let line_total = product
            .as_ref()
            .map(|p| p.selling_price().times(transaction.units()))
            .unwrap_or(Money::ZERO);
        let vat = line_total.percent(company.vat_rate);

        Self {
            transaction,
            product,
            customer,
            company,
            line_total,
            vat,
            grand_total: line_total + vat,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Parties(#[from] PartyError),
}

/// Gather what a receipt needs for `transaction`.
pub async fn receipt_for<S, D>(
    ledger: &StockLedger<S>,
    directory: &D,
    transaction: Transaction,
    company: CompanyProfile,
) -> Result<Receipt, ReceiptError>
where
    S: LedgerStore,
    D: PartyDirectory + ?Sized,
{
    let product = match ledger.product(&transaction.sku).await {
        Ok(product) => Some(product),
        Err(LedgerError::ProductNotFound(_)) => None,
        Err(other) => return Err(other.into()),
    };

    let customer = if transaction.kind == MovementKind::Out {
        directory
            .find_by_name(PartyKind::Customer, &transaction.counterparty)
            .await?
    } else {
        None
    };

    Ok(Receipt::assemble(transaction, product, customer, company))
}
