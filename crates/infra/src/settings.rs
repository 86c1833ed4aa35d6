//! Admin-editable company settings.
//!
//! Seeded from `AppConfig::company` at startup; admins may replace the profile
//! at runtime. Receipts read whatever is current.

use std::sync::RwLock;

use thiserror::Error;
use tracing::info;

use stockledger_auth::{AuthzError, Permission, Principal, authorize};
use stockledger_core::DomainError;
use stockledger_reporting::CompanyProfile;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("settings backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Default)]
pub struct CompanySettings {
    profile: RwLock<CompanyProfile>,
}

impl CompanySettings {
    pub fn new(profile: CompanyProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    pub fn current(&self) -> Result<CompanyProfile, SettingsError> {
        self.profile
            .read()
            .map(|profile| profile.clone())
            .map_err(|_| SettingsError::Backend("lock poisoned".to_string()))
    }

    /// Replace the profile. Needs `settings.write`; an invalid profile changes nothing.
    #[tracing::instrument(skip(self, acting, profile), fields(acting = %acting.username))]
    pub fn update(
        &self,
        acting: &Principal,
        profile: CompanyProfile,
    ) -> Result<CompanyProfile, SettingsError> {
        authorize(acting, &Permission::SETTINGS_WRITE)?;
        profile.validate()?;

        let mut current = self
            .profile
            .write()
            .map_err(|_| SettingsError::Backend("lock poisoned".to_string()))?;
        *current = profile.clone();
        info!(vat_rate = profile.vat_rate, "company settings updated");
        Ok(profile)
    }
}
