#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Scheduling daemon for watchpost validations.

pub mod config;
pub mod jobs;
pub mod scheduler;

pub use config::Args;
pub use scheduler::{Scheduler, SchedulerError, SchedulerOptions, Task};
