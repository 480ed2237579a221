//! Process settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::RunFilter;

/// Directory used when none is configured.
pub const DEFAULT_DIRECTORY: &str = "/data/watchpost";
/// Catalog id of the in-memory repositories.
pub const MEMORY: &str = "memory";
/// Catalog id of the log notifier.
pub const LOG_NOTIFIER: &str = "log";

/// Process-wide settings shared by the loader, the engine and the built-in actions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root directory; validations are discovered under `<directory>/validations`.
    pub directory: PathBuf,
    /// When non-empty, only these validations run.
    pub run_only_validations: Vec<String>,
    /// Validations that never run.
    pub skip_validations: Vec<String>,
    /// History default used when a validation does not set `notification.add_to_history`.
    pub append_notification_to_history: bool,
    /// Catalog id of the validation store.
    pub validation_repository: String,
    /// Catalog id of the thread record repository.
    pub notification_repository: String,
    /// Catalog id of the history repository.
    pub history_repository: String,
    /// Catalog ids of the notifiers to build.
    pub notifiers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            run_only_validations: Vec::new(),
            skip_validations: Vec::new(),
            append_notification_to_history: false,
            validation_repository: MEMORY.to_string(),
            notification_repository: MEMORY.to_string(),
            history_repository: MEMORY.to_string(),
            notifiers: vec![LOG_NOTIFIER.to_string()],
        }
    }
}

impl Settings {
    /// Reads settings from a TOML file; missing keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<directory>/validations`.
    pub fn validations_dir(&self) -> PathBuf {
        self.directory.join("validations")
    }

    /// Allow and skip lists as a [`RunFilter`].
    pub fn run_filter(&self) -> RunFilter {
        RunFilter::new(self.run_only_validations.clone(), self.skip_validations.clone())
    }
}
