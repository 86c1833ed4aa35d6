use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{DomainError, DomainResult};

/// Party identifier (time-ordered UUID).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(Uuid);

impl PartyId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// Contact information for a party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A customer or supplier whose name appears as a transaction counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    kind: PartyKind,
    name: String,
    /// Person to ask for at a supplier. Always None for customers.
    contact_person: Option<String>,
    contact: ContactInfo,
    registered_at: DateTime<Utc>,
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub kind: PartyKind,
    pub name: String,
    pub contact_person: Option<String>,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

impl RegisterParty {
    pub fn customer(name: impl Into<String>, contact: ContactInfo, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: PartyKind::Customer,
            name: name.into(),
            contact_person: None,
            contact,
            occurred_at,
        }
    }

    pub fn supplier(
        name: impl Into<String>,
        contact_person: Option<String>,
        contact: ContactInfo,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: PartyKind::Supplier,
            name: name.into(),
            contact_person,
            contact,
            occurred_at,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Party {
    /// Validate a registration and build the party it describes.
    pub fn register(id: PartyId, cmd: RegisterParty) -> DomainResult<Self> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let contact_person = match cmd.kind {
            PartyKind::Supplier => non_blank(cmd.contact_person),
            PartyKind::Customer => None,
        };

        Ok(Self {
            id,
            kind: cmd.kind,
            name: name.to_string(),
            contact_person,
            contact: ContactInfo {
                email: non_blank(cmd.contact.email),
                phone: non_blank(cmd.contact.phone),
                address: non_blank(cmd.contact.address),
            },
            registered_at: cmd.occurred_at,
        })
    }

    pub fn id(&self) -> PartyId {
        self.id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact_person(&self) -> Option<&str> {
        self.contact_person.as_deref()
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartyError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("party not found: {0}")]
    NotFound(PartyId),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Customer and supplier directory.
#[async_trait::async_trait]
pub trait PartyDirectory: Send + Sync {
    /// Validate and store a new party.
    async fn register(&self, cmd: RegisterParty) -> Result<Party, PartyError>;

    async fn get(&self, id: PartyId) -> Result<Party, PartyError>;

    /// Parties of one kind, in registration order.
    async fn list(&self, kind: PartyKind) -> Result<Vec<Party>, PartyError>;

    /// First party of `kind` whose name equals `name` exactly.
    async fn find_by_name(&self, kind: PartyKind, name: &str) -> Result<Option<Party>, PartyError>;
}
