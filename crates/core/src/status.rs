//! Severity levels and how they combine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidStatus;

/// Outcome severity of a validation, ordered `Normal < Warning < Problem`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Everything is fine.
    Normal,
    /// Degraded, worth a look.
    Warning,
    /// Broken.
    Problem,
}

impl Status {
    /// All statuses, lowest severity first.
    pub const ALL: [Status; 3] = [Status::Normal, Status::Warning, Status::Problem];

    /// Uppercase name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "NORMAL",
            Status::Warning => "WARNING",
            Status::Problem => "PROBLEM",
        }
    }

    /// Returns the more severe of `self` and `new`; keeps `self` on ties.
    pub fn combine(self, new: Status) -> Status {
        combine(self, new)
    }
}

/// Escalates `old` to `new` only when `new` is strictly more severe.
pub fn combine(old: Status, new: Status) -> Status {
    if new > old {
        new
    } else {
        old
    }
}

/// Folds a sequence of statuses into the most severe one, starting at `Normal`.
pub fn combine_all<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().fold(Status::Normal, combine)
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Status::Normal),
            "WARNING" => Ok(Status::Warning),
            "PROBLEM" => Ok(Status::Problem),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}
