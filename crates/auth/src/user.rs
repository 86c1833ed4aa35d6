//! User accounts and their management.
//!
//! Holds usernames and roles only; credentials belong to whatever login layer
//! sits in front. Management is admin work (`users.manage`) with two guards:
//! nobody deletes their own account, and nobody changes their own role.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use stockledger_core::Actor;

use crate::{AuthzError, Permission, Principal, Role, authorize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: Actor,
    pub role: Role,
}

impl UserAccount {
    pub fn new(username: Actor, role: Role) -> Self {
        Self { username, role }
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.username.clone(), self.role.clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("username already taken: {0}")]
    Duplicate(Actor),

    #[error("user not found: {0}")]
    NotFound(Actor),

    #[error("cannot {0} your own account")]
    SelfTarget(&'static str),

    #[error("unknown role: {0}")]
    UnknownRole(Role),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Where user accounts live.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with `UserError::Duplicate` if the username is taken.
    async fn create(&self, account: UserAccount) -> Result<UserAccount, UserError>;

    async fn get(&self, username: &Actor) -> Result<Option<UserAccount>, UserError>;

    /// All accounts, ordered by username.
    async fn list(&self) -> Result<Vec<UserAccount>, UserError>;

    /// Fails with `UserError::NotFound` for an unknown username.
    async fn delete(&self, username: &Actor) -> Result<(), UserError>;

    async fn set_role(&self, username: &Actor, role: Role) -> Result<UserAccount, UserError>;
}

fn ensure_known(role: &Role) -> Result<(), UserError> {
    if role.is_known() {
        Ok(())
    } else {
        Err(UserError::UnknownRole(role.clone()))
    }
}

fn ensure_not_self(acting: &Principal, target: &Actor, action: &'static str) -> Result<(), UserError> {
    if &acting.username == target {
        return Err(UserError::SelfTarget(action));
    }
    Ok(())
}

/// Permission-checked account administration over a directory.
#[derive(Debug, Clone)]
pub struct UserManagement<D> {
    directory: D,
}

impl<D> UserManagement<D>
where
    D: UserDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Add an account. A missing role means staff.
    #[tracing::instrument(skip(self, acting), fields(acting = %acting.username, username = %username))]
    pub async fn create_user(
        &self,
        acting: &Principal,
        username: Actor,
        role: Option<Role>,
    ) -> Result<UserAccount, UserError> {
        authorize(acting, &Permission::USERS_MANAGE)?;
        let role = role.unwrap_or_default();
        ensure_known(&role)?;

        let account = self.directory.create(UserAccount::new(username, role)).await?;
        info!(role = %account.role, "user created");
        Ok(account)
    }

    pub async fn list_users(&self, acting: &Principal) -> Result<Vec<UserAccount>, UserError> {
        authorize(acting, &Permission::USERS_MANAGE)?;
        self.directory.list().await
    }

    #[tracing::instrument(skip(self, acting), fields(acting = %acting.username, username = %username))]
    pub async fn delete_user(&self, acting: &Principal, username: &Actor) -> Result<(), UserError> {
        authorize(acting, &Permission::USERS_MANAGE)?;
        ensure_not_self(acting, username, "delete")?;

        self.directory.delete(username).await?;
        info!("user deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self, acting), fields(acting = %acting.username, username = %username, role = %role))]
    pub async fn change_role(
        &self,
        acting: &Principal,
        username: &Actor,
        role: Role,
    ) -> Result<UserAccount, UserError> {
        authorize(acting, &Permission::USERS_MANAGE)?;
        ensure_known(&role)?;
        ensure_not_self(acting, username, "change the role of")?;

        let account = self.directory.set_role(username, role).await?;
        info!("user role changed");
        Ok(account)
    }
}
