//! The result a validation produces.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidStatus;
use crate::status::Status;

/// Format of `last_execution` in rendered attributes.
pub const LAST_EXECUTION_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Result of one validation run.
///
/// Built fresh by every invocation of a validation body (or synthesized by the
/// engine when the body fails). Only `validation_name` (stamped by the engine)
/// and `last_execution` (stamped by the repository on save) change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResponse {
    #[serde(default)]
    validation_name: String,
    status: Status,
    #[serde(default)]
    details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_execution: Option<DateTime<Local>>,
}

impl ValidationResponse {
    /// Response with `status` and `details`, not yet stamped.
    pub fn new(status: Status, details: Value) -> Self {
        Self {
            validation_name: String::new(),
            status,
            details,
            settings: None,
            last_execution: None,
        }
    }

    /// Builds a response from a textual status, rejecting anything outside the enum.
    pub fn from_status_str(status: &str, details: Value) -> Result<Self, InvalidStatus> {
        Ok(Self::new(status.parse()?, details))
    }

    /// Attaches the validation-specific settings snapshot.
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Name stamped by the engine; empty before the run completes.
    pub fn validation_name(&self) -> &str {
        &self.validation_name
    }

    /// Stamps the owning validation's name.
    pub fn set_validation_name(&mut self, name: impl Into<String>) {
        self.validation_name = name.into();
    }

    /// Severity of the outcome.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Free-form details reported by the body.
    pub fn details(&self) -> &Value {
        &self.details
    }

    pub(crate) fn details_mut(&mut self) -> &mut Value {
        &mut self.details
    }

    /// Settings snapshot attached by the body, if any.
    pub fn settings(&self) -> Option<&Value> {
        self.settings.as_ref()
    }

    /// When the result was saved, if it was.
    pub fn last_execution(&self) -> Option<DateTime<Local>> {
        self.last_execution
    }

    /// Stamps the save time.
    pub fn set_last_execution(&mut self, at: DateTime<Local>) {
        self.last_execution = Some(at);
    }

    /// Reads a boolean flag from `details`, `false` when absent.
    pub fn detail_flag(&self, key: &str) -> bool {
        self.details
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// All attributes as an ordered JSON object.
    pub fn attributes(&self) -> Value {
        let mut attrs = Map::new();
        attrs.insert("validation_name".into(), Value::from(self.validation_name.clone()));
        attrs.insert("status".into(), Value::from(self.status.as_str()));
        attrs.insert("details".into(), self.details.clone());
        attrs.insert(
            "settings".into(),
            self.settings.clone().unwrap_or(Value::Null),
        );
        if let Some(at) = self.last_execution {
            attrs.insert(
                "last_execution".into(),
                Value::from(at.format(LAST_EXECUTION_FORMAT).to_string()),
            );
        }
        Value::Object(attrs)
    }
}

impl fmt::Display for ValidationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attributes())
    }
}
