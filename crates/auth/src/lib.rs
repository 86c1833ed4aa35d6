//! `stockledger-auth` — role-based capability checks.
//!
//! Decoupled from HTTP and sessions; user accounts sit behind `UserDirectory`.
//! The ledger itself is role-agnostic: callers check a permission here, then
//! pass the principal's username to the ledger as the acting identity.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{
    AuthorizationExplanation, AuthzError, authorize, explain_authorization, role_permissions,
};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use user::{UserAccount, UserDirectory, UserError, UserManagement};
