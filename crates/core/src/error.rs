//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// A status outside `NORMAL`, `WARNING`, `PROBLEM`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0} is not a valid status")]
pub struct InvalidStatus(pub String);

/// Kinds of identifiers the catalog resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    /// A validation action.
    Action,
    /// A declarative command.
    Command,
    /// A code module.
    Module,
    /// A validation store implementation.
    ValidationRepository,
    /// A thread record repository implementation.
    NotificationRepository,
    /// A history repository implementation.
    HistoryRepository,
    /// A notifier implementation.
    Notifier,
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CatalogKind::Action => "action",
            CatalogKind::Command => "command",
            CatalogKind::Module => "module",
            CatalogKind::ValidationRepository => "validation repository",
            CatalogKind::NotificationRepository => "notification repository",
            CatalogKind::HistoryRepository => "history repository",
            CatalogKind::Notifier => "notifier",
        };
        f.write_str(s)
    }
}

/// Failures while discovering and binding validation definitions.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The validations tree could not be walked.
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    /// A definition file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A declarative file is not valid YAML for the expected schema.
    #[error("malformed validation file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    /// An identifier is missing from the catalog.
    #[error("unresolved {kind} '{id}'")]
    Unresolved { kind: CatalogKind, id: String },
    /// A code module returned an error while registering.
    #[error("module {module} failed to register: {source}")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures while reading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid TOML for [`crate::Settings`].
    #[error("failed to parse settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Lookup of a validation name the registry does not know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("validation '{0}' is not registered")]
pub struct UnknownValidation(pub String);
