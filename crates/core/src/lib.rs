#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Validation engine, loader and notification state machine for the watchpost daemon.

pub mod actions;
pub mod catalog;
pub mod commands;
pub mod error;
pub mod loader;
pub mod memory;
pub mod notification;
pub mod registry;
pub mod repository;
pub mod response;
pub mod schedule;
pub mod services;
pub mod settings;
pub mod status;
pub mod summary;

mod util;

pub use catalog::Catalog;
pub use error::{InvalidStatus, LoadError};
pub use registry::{Action, Registry, RunFilter, ValidationDef, ValidationRef};
pub use response::ValidationResponse;
pub use services::Services;
pub use settings::Settings;
pub use status::{combine, combine_all, Status};
pub use util::{new_ulid, now};
