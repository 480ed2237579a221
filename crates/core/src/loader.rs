//! Discovery of validation definitions under `<directory>/validations`.
//!
//! Two strategies, picked by file extension:
//! - `*_validation.rs` marks a code module; the module registered in the
//!   catalog under the file's dotted path (`validations.sub.disk_validation`)
//!   is run against the registry once.
//! - `*_validation.yaml` is a declarative file whose entries are bound to
//!   catalog commands and actions and registered like code validations.
//!
//! Any malformed file or unknown identifier aborts the whole load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::error::{CatalogKind, LoadError};
use crate::registry::{Action, Registry, ValidationDef};

/// Subdirectory of the configured directory that holds definition files.
pub const VALIDATIONS_DIR: &str = "validations";
const SUFFIX: &str = "_validation";

/// A definition file found by [`discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// A `*_validation.rs` marker for a code module registered in the catalog.
    Module { path: PathBuf, module: String },
    /// A `*_validation.yaml` file.
    Declarative { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct DeclarativeFile {
    #[serde(default)]
    validations: Vec<DeclarativeValidation>,
}

#[derive(Debug, Deserialize)]
struct DeclarativeValidation {
    validation_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    actions_on_error: Vec<String>,
    #[serde(default)]
    schedule: Value,
    #[serde(default)]
    settings: Value,
    execute: Execute,
}

#[derive(Debug, Deserialize)]
struct Execute {
    command: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Dotted module path of `path` relative to `root`, without extension.
pub fn module_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("."))
}

/// Lists definition files under `<root>/validations` in path order.
pub fn discover(root: &Path) -> Result<Vec<Definition>, LoadError> {
    let dir = root.join(VALIDATIONS_DIR);
    if !dir.is_dir() {
        warn!(path = %dir.display(), "validations directory not found");
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: dir.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_definition = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with(SUFFIX));
        if !is_definition {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => {
                if let Some(module) = module_path(root, path) {
                    found.push(Definition::Module {
                        path: path.to_path_buf(),
                        module,
                    });
                }
            }
            Some("yaml") => found.push(Definition::Declarative {
                path: path.to_path_buf(),
            }),
            _ => {}
        }
    }
    Ok(found)
}

/// Registers every validation defined under `<root>/validations`.
///
/// Returns the number of definition files applied. Code modules already
/// loaded into `registry` are skipped.
pub fn load_validations(root: &Path, registry: &mut Registry, catalog: &Catalog) -> Result<usize, LoadError> {
    let definitions = discover(root)?;
    let mut applied = 0;
    for definition in definitions {
        match definition {
            Definition::Module { path, module } => {
                if load_module(&path, &module, registry, catalog)? {
                    applied += 1;
                }
            }
            Definition::Declarative { path } => {
                load_declarative(&path, registry, catalog)?;
                applied += 1;
            }
        }
    }
    info!(applied, validations = registry.len(), "validations loaded");
    Ok(applied)
}

fn load_module(path: &Path, module: &str, registry: &mut Registry, catalog: &Catalog) -> Result<bool, LoadError> {
    let register = catalog.module(module).ok_or_else(|| LoadError::Unresolved {
        kind: CatalogKind::Module,
        id: module.to_string(),
    })?;
    if !registry.mark_module_loaded(module) {
        debug!(%module, "module already loaded");
        return Ok(false);
    }
    debug!(%module, path = %path.display(), "loading validation module");
    register(registry).map_err(|source| LoadError::Module {
        module: module.to_string(),
        source,
    })?;
    Ok(true)
}

fn load_declarative(path: &Path, registry: &mut Registry, catalog: &Catalog) -> Result<(), LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        warn!(path = %path.display(), "empty validation file");
        return Ok(());
    }
    let file: DeclarativeFile = serde_yaml::from_str(&raw).map_err(|source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    for validation in file.validations {
        let command = catalog.command(&validation.execute.command)?;
        let actions = resolve_actions(catalog, &validation.actions)?;
        let actions_on_error = resolve_actions(catalog, &validation.actions_on_error)?;
        let args: Arc<[Value]> = validation.execute.args.into();

        let mut def = ValidationDef::new(validation.validation_name, move || command(&args[..]))
            .actions(actions)
            .actions_on_error(actions_on_error)
            .schedule(validation.schedule)
            .settings(validation.settings);
        if let Some(description) = validation.description {
            def = def.description(description);
        }
        if let Some(group) = validation.group {
            def = def.group(group);
        }
        registry.register(def);
    }
    debug!(path = %path.display(), "loaded declarative validations");
    Ok(())
}

fn resolve_actions(catalog: &Catalog, ids: &[String]) -> Result<Vec<Action>, LoadError> {
    ids.iter().map(|id| catalog.action(id)).collect()
}
