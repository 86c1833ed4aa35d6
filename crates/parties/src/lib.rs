//! Parties domain module: customers and suppliers.
//!
//! Parties are the counterparties named on stock movements. The ledger stores
//! only their name, so nothing here is consulted when stock moves.

pub mod party;

pub use party::{
    ContactInfo, Party, PartyDirectory, PartyError, PartyId, PartyKind, RegisterParty,
};
