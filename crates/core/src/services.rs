//! Process-wide collaborators resolved from settings.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::LoadError;
use crate::notification::Notifiers;
use crate::repository::{Repositories, ValidationRepository};
use crate::settings::Settings;

/// Collaborators shared by the built-in actions.
#[derive(Debug, Clone)]
pub struct Services {
    /// Settings the process started with.
    pub settings: Settings,
    /// Configured repositories.
    pub repositories: Repositories,
    /// Configured notifiers, in configuration order.
    pub notifiers: Notifiers,
}

impl Services {
    /// Bundles already-built collaborators.
    pub fn new(settings: Settings, repositories: Repositories, notifiers: Notifiers) -> Self {
        Self {
            settings,
            repositories,
            notifiers,
        }
    }

    /// Picks repositories and notifiers by the identifiers named in `settings`.
    pub fn resolve(catalog: &Catalog, settings: Settings) -> Result<Self, LoadError> {
        let repositories = Repositories {
            validation: ValidationRepository::new(catalog.validation_store(&settings.validation_repository)?),
            notification: catalog.notification_repository(&settings.notification_repository)?,
            history: catalog.history_repository(&settings.history_repository)?,
        };
        let notifiers = settings
            .notifiers
            .iter()
            .map(|id| catalog.notifier(id))
            .collect::<Result<Vec<_>, _>>()
            .map(Notifiers::new)?;
        Ok(Self::new(settings, repositories, notifiers))
    }

    /// Wraps the services for sharing across actions.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
