use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Modeled as an opaque string (e.g. "stock.move"). The wildcard `"*"` grants
/// everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    /// Record IN/OUT movements.
    pub const STOCK_MOVE: Permission = Permission(Cow::Borrowed("stock.move"));
    /// Correct stock to a counted value.
    pub const STOCK_ADJUST: Permission = Permission(Cow::Borrowed("stock.adjust"));
    /// View products and history.
    pub const STOCK_READ: Permission = Permission(Cow::Borrowed("stock.read"));
    /// Create, edit, delete products.
    pub const CATALOG_WRITE: Permission = Permission(Cow::Borrowed("catalog.write"));
    pub const CATALOG_IMPORT: Permission = Permission(Cow::Borrowed("catalog.import"));
    pub const CATALOG_EXPORT: Permission = Permission(Cow::Borrowed("catalog.export"));
    /// Register customers and suppliers.
    pub const PARTIES_WRITE: Permission = Permission(Cow::Borrowed("parties.write"));
    /// Profit report and dashboard figures.
    pub const REPORTS_READ: Permission = Permission(Cow::Borrowed("reports.read"));
    pub const SETTINGS_WRITE: Permission = Permission(Cow::Borrowed("settings.write"));
    pub const USERS_MANAGE: Permission = Permission(Cow::Borrowed("users.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
