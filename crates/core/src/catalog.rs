//! Identifier lookup table for everything validation files refer to by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CatalogKind, LoadError};
use crate::memory::{MemoryHistoryRepository, MemoryNotificationRepository, MemoryValidationStore};
use crate::notification::{LogNotifier, Notifier};
use crate::registry::{Action, Registry};
use crate::repository::{HistoryRepository, NotificationRepository, ValidationStore};
use crate::response::ValidationResponse;
use crate::services::Services;
use crate::settings::{LOG_NOTIFIER, MEMORY};
use crate::{actions, commands};

/// Parameterised validation body used by declarative files: `execute: {command, args}`.
pub type Command = Arc<dyn Fn(&[Value]) -> anyhow::Result<ValidationResponse> + Send + Sync>;

/// Code module registering validations into the registry when activated.
pub type Module = Arc<dyn Fn(&mut Registry) -> anyhow::Result<()> + Send + Sync>;

type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Named actions, commands, code modules and implementation factories.
///
/// Registering an id twice keeps the later entry and logs a warning.
pub struct Catalog {
    actions: BTreeMap<String, Action>,
    commands: BTreeMap<String, Command>,
    modules: BTreeMap<String, Module>,
    validation_stores: BTreeMap<String, Factory<dyn ValidationStore>>,
    notification_repositories: BTreeMap<String, Factory<dyn NotificationRepository>>,
    history_repositories: BTreeMap<String, Factory<dyn HistoryRepository>>,
    notifiers: BTreeMap<String, Factory<dyn Notifier>>,
}

fn declare<T>(map: &mut BTreeMap<String, T>, kind: CatalogKind, id: String, value: T) {
    if map.contains_key(&id) {
        warn!(%kind, %id, "overwriting implementation");
    }
    info!(%kind, %id, "declared implementation");
    map.insert(id, value);
}

fn lookup<T: Clone>(map: &BTreeMap<String, T>, kind: CatalogKind, id: &str) -> Result<T, LoadError> {
    map.get(id).cloned().ok_or_else(|| LoadError::Unresolved {
        kind,
        id: id.to_string(),
    })
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Catalog with the in-memory repositories and the log notifier.
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.register_validation_store(MEMORY, || Arc::new(MemoryValidationStore::new()));
        catalog.register_notification_repository(MEMORY, || Arc::new(MemoryNotificationRepository::new()));
        catalog.register_history_repository(MEMORY, || Arc::new(MemoryHistoryRepository::new()));
        catalog.register_notifier(LOG_NOTIFIER, || Arc::new(LogNotifier::new()));
        catalog
    }

    /// Catalog without any entries.
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
            commands: BTreeMap::new(),
            modules: BTreeMap::new(),
            validation_stores: BTreeMap::new(),
            notification_repositories: BTreeMap::new(),
            history_repositories: BTreeMap::new(),
            notifiers: BTreeMap::new(),
        }
    }

    /// [`Catalog::new`] plus the built-in actions and commands bound to `services`.
    pub fn with_builtins(services: &Arc<Services>) -> Self {
        let mut catalog = Self::new();
        catalog.register_builtins(services);
        catalog
    }

    /// Adds the built-in actions bound to `services` and the built-in commands.
    pub fn register_builtins(&mut self, services: &Arc<Services>) {
        actions::register(self, services);
        commands::register(self);
    }

    /// Registers `action` under its own name.
    pub fn register_action(&mut self, action: Action) {
        declare(&mut self.actions, CatalogKind::Action, action.name().to_string(), action);
    }

    /// Registers a command usable from declarative `execute` blocks.
    pub fn register_command<F>(&mut self, id: impl Into<String>, command: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<ValidationResponse> + Send + Sync + 'static,
    {
        let command: Command = Arc::new(command);
        declare(&mut self.commands, CatalogKind::Command, id.into(), command);
    }

    /// Registers a code module under its dotted path, e.g. `validations.disk_validation`.
    pub fn register_module<F>(&mut self, path: impl Into<String>, module: F)
    where
        F: Fn(&mut Registry) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let module: Module = Arc::new(module);
        declare(&mut self.modules, CatalogKind::Module, path.into(), module);
    }

    /// Registers a validation store factory selectable from settings.
    pub fn register_validation_store<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ValidationStore> + Send + Sync + 'static,
    {
        let factory: Factory<dyn ValidationStore> = Arc::new(factory);
        declare(&mut self.validation_stores, CatalogKind::ValidationRepository, id.into(), factory);
    }

    /// Registers a thread record repository factory selectable from settings.
    pub fn register_notification_repository<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn NotificationRepository> + Send + Sync + 'static,
    {
        let factory: Factory<dyn NotificationRepository> = Arc::new(factory);
        declare(
            &mut self.notification_repositories,
            CatalogKind::NotificationRepository,
            id.into(),
            factory,
        );
    }

    /// Registers a history repository factory selectable from settings.
    pub fn register_history_repository<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn HistoryRepository> + Send + Sync + 'static,
    {
        let factory: Factory<dyn HistoryRepository> = Arc::new(factory);
        declare(&mut self.history_repositories, CatalogKind::HistoryRepository, id.into(), factory);
    }

    /// Registers a notifier factory selectable from settings.
    pub fn register_notifier<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Notifier> + Send + Sync + 'static,
    {
        let factory: Factory<dyn Notifier> = Arc::new(factory);
        declare(&mut self.notifiers, CatalogKind::Notifier, id.into(), factory);
    }

    /// Action registered as `id`.
    pub fn action(&self, id: &str) -> Result<Action, LoadError> {
        lookup(&self.actions, CatalogKind::Action, id)
    }

    /// Command registered as `id`.
    pub fn command(&self, id: &str) -> Result<Command, LoadError> {
        lookup(&self.commands, CatalogKind::Command, id)
    }

    /// Code module registered under the dotted `path`, if any.
    pub fn module(&self, path: &str) -> Option<Module> {
        self.modules.get(path).cloned()
    }

    /// Builds the validation store registered as `id`.
    pub fn validation_store(&self, id: &str) -> Result<Arc<dyn ValidationStore>, LoadError> {
        lookup(&self.validation_stores, CatalogKind::ValidationRepository, id).map(|f| f())
    }

    /// Builds the thread record repository registered as `id`.
    pub fn notification_repository(&self, id: &str) -> Result<Arc<dyn NotificationRepository>, LoadError> {
        lookup(&self.notification_repositories, CatalogKind::NotificationRepository, id).map(|f| f())
    }

    /// Builds the history repository registered as `id`.
    pub fn history_repository(&self, id: &str) -> Result<Arc<dyn HistoryRepository>, LoadError> {
        lookup(&self.history_repositories, CatalogKind::HistoryRepository, id).map(|f| f())
    }

    /// Builds the notifier registered as `id`.
    pub fn notifier(&self, id: &str) -> Result<Arc<dyn Notifier>, LoadError> {
        lookup(&self.notifiers, CatalogKind::Notifier, id).map(|f| f())
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("notifiers", &self.notifiers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn unknown_identifiers_are_unresolved() {
        let catalog = Catalog::new();
        let err = catalog.action("nope").unwrap_err();
        assert!(matches!(
            err,
            LoadError::Unresolved {
                kind: CatalogKind::Action,
                ..
            }
        ));
        assert_eq!(err.to_string(), "unresolved action 'nope'");
        assert!(catalog.notifier("chat").is_err());
    }

    #[test]
    fn builtins_are_registered() {
        let catalog = Catalog::new();
        let services = Services::resolve(&catalog, Settings::default()).unwrap().into_shared();
        let catalog = Catalog::with_builtins(&services);
        for id in ["save_result_into_database", "notify_in_thread", "notify_in_single_message"] {
            assert_eq!(catalog.action(id).unwrap().name(), id);
        }
        assert!(catalog.command("process.exit_status").is_ok());
        assert_eq!(services.notifiers.len(), 1);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut catalog = Catalog::empty();
        catalog.register_command("check", |_args: &[Value]| {
            Ok(ValidationResponse::new(crate::Status::Normal, Value::Null))
        });
        catalog.register_command("check", |_args: &[Value]| {
            Ok(ValidationResponse::new(crate::Status::Warning, Value::Null))
        });
        let command = catalog.command("check").unwrap();
        assert_eq!(command(&[]).unwrap().status(), crate::Status::Warning);
    }
}
