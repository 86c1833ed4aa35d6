use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateRoot, DomainError, DomainResult, Money, Sku};

/// Category assigned when none is given.
pub const DEFAULT_CATEGORY: &str = "General";

/// Reorder threshold assigned when none is given.
pub const DEFAULT_MIN_QUANTITY: i64 = 5;

/// Everything about a product an admin may edit.
///
/// Quantity is deliberately absent: it only moves through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub cost_price: Money,
    pub selling_price: Money,
    /// Low-stock threshold: the product is flagged when quantity drops below it.
    pub min_quantity: i64,
    /// Opaque reference to an image stored elsewhere (file name, URL, ...).
    pub image_ref: Option<String>,
}

impl ProductDetails {
    /// Details with only a name set and defaults elsewhere.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: DEFAULT_CATEGORY.to_string(),
            description: None,
            cost_price: Money::ZERO,
            selling_price: Money::ZERO,
            min_quantity: DEFAULT_MIN_QUANTITY,
            image_ref: None,
        }
    }

    pub fn with_prices(mut self, cost_price: Money, selling_price: Money) -> Self {
        self.cost_price = cost_price;
        self.selling_price = selling_price;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::validation("category cannot be empty"));
        }
        if self.cost_price.is_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
        if self.selling_price.is_negative() {
            return Err(DomainError::validation("selling price cannot be negative"));
        }
        if self.min_quantity < 0 {
            return Err(DomainError::validation("minimum quantity cannot be negative"));
        }
        Ok(())
    }
}

/// Input for creating a product. New products always start with zero stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: Sku,
    pub details: ProductDetails,
}

impl NewProduct {
    pub fn new(sku: Sku, details: ProductDetails) -> Self {
        Self { sku, details }
    }
}

/// A catalog product together with its cached on-hand quantity.
///
/// `quantity` is a cache of the ledger sum for this SKU; stores keep the two
/// in step by writing both in one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    sku: Sku,
    details: ProductDetails,
    quantity: i64,
    version: u64,
}

impl Product {
    /// Rebuild a product from persisted state. Intended for store implementations.
    pub fn restore(sku: Sku, details: ProductDetails, quantity: i64, version: u64) -> Self {
        Self {
            sku,
            details,
            quantity,
            version,
        }
    }

    /// First persisted state of a new product.
    pub fn created(new: NewProduct, opening_quantity: i64) -> Self {
        Self::restore(new.sku, new.details, opening_quantity, 1)
    }

    /// State after a committed quantity write (version bumped).
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self.version += 1;
        self
    }

    /// State after a committed details edit (version bumped).
    pub fn with_details(mut self, details: ProductDetails) -> Self {
        self.details = details;
        self.version += 1;
        self
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn category(&self) -> &str {
        &self.details.category
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn cost_price(&self) -> Money {
        self.details.cost_price
    }

    pub fn selling_price(&self) -> Money {
        self.details.selling_price
    }

    pub fn min_quantity(&self) -> i64 {
        self.details.min_quantity
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity < self.details.min_quantity
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity == 0
    }

    /// Case-insensitive substring match on name or SKU.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.details.name.to_lowercase().contains(&needle)
            || self.sku.as_str().to_lowercase().contains(&needle)
    }
}

impl AggregateRoot for Product {
    type Id = Sku;

    fn id(&self) -> &Self::Id {
        &self.sku
    }

    fn version(&self) -> u64 {
        self.version
    }
}
