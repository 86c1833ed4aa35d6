use serde::{Deserialize, Serialize};

use stockledger_core::Actor;

use crate::Role;

/// An authenticated user as seen by authorization checks.
///
/// How the user logged in is none of this crate's business; callers build the
/// principal from whatever session they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: Actor,
    pub role: Role,
}

impl Principal {
    pub fn new(username: Actor, role: Role) -> Self {
        Self { username, role }
    }

    pub fn admin(username: Actor) -> Self {
        Self::new(username, Role::ADMIN)
    }

    pub fn staff(username: Actor) -> Self {
        Self::new(username, Role::STAFF)
    }

    /// Identity recorded on the ledger transactions this principal causes.
    pub fn actor(&self) -> &Actor {
        &self.username
    }
}
