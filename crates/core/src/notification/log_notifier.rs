use serde_json::Value;
use tracing::info;

use super::{Content, Notifier};
use crate::util::new_ulid;

/// Notifier that writes every message to the tracing log.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    name: String,
}

impl LogNotifier {
    /// Log notifier named `log`.
    pub fn new() -> Self {
        Self::named("log")
    }

    /// Log notifier reporting under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_single_message(&self, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        for message in content.messages() {
            info!(notifier = %self.name, %message, "single message");
        }
        Ok(())
    }

    fn init_thread(&self, content: &Content, _settings: &Value) -> anyhow::Result<Value> {
        let thread = new_ulid().to_string();
        for message in content.messages() {
            info!(notifier = %self.name, %thread, %message, "thread opened");
        }
        Ok(Value::from(thread))
    }

    fn update_thread(&self, handle: &Value, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        for message in content.messages() {
            info!(notifier = %self.name, thread = %handle, %message, "thread updated");
        }
        Ok(())
    }

    fn close_thread(&self, handle: &Value, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        for message in content.messages() {
            info!(notifier = %self.name, thread = %handle, %message, "thread closed");
        }
        Ok(())
    }
}
