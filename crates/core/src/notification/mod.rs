//! Notification records, the notifier contract and the thread state machine.

mod content;
mod log_notifier;
mod thread;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::status::Status;
use crate::util::new_ulid;

pub use content::{render_content, render_template, Content, TemplateError};
pub use log_notifier::LogNotifier;
pub use thread::{notify_in_single_message, notify_in_thread};

/// Live thread record for one validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationStatus {
    /// Validation this thread belongs to.
    pub validation_name: String,
    /// Notifier name to the opaque handle that notifier returned from `init_thread`.
    pub thread_ids: BTreeMap<String, Value>,
    /// False once the thread was closed.
    pub is_opened: bool,
    /// When the thread was last opened, updated or closed.
    pub last_notification: DateTime<Local>,
}

impl NotificationStatus {
    /// Record of a thread just opened at `now`.
    pub fn open(
        validation_name: impl Into<String>,
        thread_ids: BTreeMap<String, Value>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            validation_name: validation_name.into(),
            thread_ids,
            is_opened: true,
            last_notification: now,
        }
    }

    /// Marks the thread as notified again at `now`.
    pub fn update(&mut self, now: DateTime<Local>) {
        self.is_opened = true;
        self.last_notification = now;
    }

    /// Marks the thread closed at `now`.
    pub fn close(&mut self, now: DateTime<Local>) {
        self.is_opened = false;
        self.last_notification = now;
    }

    /// Whole seconds since the last notification, zero if the clock went backwards.
    pub fn seconds_since_last(&self, now: DateTime<Local>) -> u64 {
        u64::try_from((now - self.last_notification).num_seconds()).unwrap_or(0)
    }
}

/// Kind of message a history entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A standalone message.
    Single,
    /// The message that opened a thread.
    InitThread,
    /// A reminder posted to an open thread.
    UpdateThread,
    /// The message that closed a thread.
    CloseThread,
}

impl NotificationType {
    /// Snake-case name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Single => "single",
            NotificationType::InitThread => "init_thread",
            NotificationType::UpdateThread => "update_thread",
            NotificationType::CloseThread => "close_thread",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationOccurrence {
    /// Unique, time-ordered id.
    pub id: Ulid,
    /// Validation that was notified about.
    pub validation_name: String,
    /// Details of the response that triggered the message.
    pub details: Value,
    /// Status of that response.
    pub status: Status,
    /// What kind of message was sent.
    pub notification_type: NotificationType,
    /// When the message was sent.
    pub created_at: DateTime<Local>,
}

impl NotificationOccurrence {
    /// New entry with a fresh id.
    pub fn new(
        validation_name: impl Into<String>,
        details: Value,
        status: Status,
        notification_type: NotificationType,
        created_at: DateTime<Local>,
    ) -> Self {
        Self {
            id: new_ulid(),
            validation_name: validation_name.into(),
            details,
            status,
            notification_type,
            created_at,
        }
    }
}

/// Transport able to deliver single messages and threaded conversations.
pub trait Notifier: Send + Sync {
    /// Name matched against `notification.disabled`.
    fn name(&self) -> &str;

    /// Delivers a standalone message.
    fn send_single_message(&self, content: &Content, settings: &Value) -> anyhow::Result<()>;

    /// Opens a thread and returns its opaque handle.
    fn init_thread(&self, content: &Content, settings: &Value) -> anyhow::Result<Value>;

    /// Posts to the thread identified by `handle`.
    fn update_thread(&self, handle: &Value, content: &Content, settings: &Value) -> anyhow::Result<()>;

    /// Posts the closing message to the thread identified by `handle`.
    fn close_thread(&self, handle: &Value, content: &Content, settings: &Value) -> anyhow::Result<()>;
}

/// The notifiers active in this process.
#[derive(Clone, Default)]
pub struct Notifiers(Vec<Arc<dyn Notifier>>);

impl Notifiers {
    /// Wraps an ordered list of notifiers.
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self(notifiers)
    }

    /// Appends a notifier.
    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.0.push(notifier);
    }

    /// Number of notifiers, disabled or not.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no notifier is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Notifiers not listed in the validation's `notification.disabled`.
    pub fn enabled<'a>(&'a self, settings: &'a Value) -> impl Iterator<Item = &'a Arc<dyn Notifier>> + 'a {
        let disabled: Vec<&str> = settings
            .pointer("/notification/disabled")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        self.0
            .iter()
            .filter(move |n| !disabled.contains(&n.name()))
    }
}

impl fmt::Debug for Notifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|n| n.name())).finish()
    }
}
