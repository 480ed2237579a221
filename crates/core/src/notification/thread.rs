use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::debug;

use super::{render_content, NotificationOccurrence, NotificationStatus, NotificationType};
use crate::response::ValidationResponse;
use crate::services::Services;
use crate::status::Status;

/// Drives the per-validation alert thread.
///
/// A first `PROBLEM` opens a thread on every enabled notifier, a later
/// `NORMAL` closes it, and any other status updates it at most once per
/// `notification.update_thread_interval` seconds. Nothing happens while no
/// thread is open and the status is not `PROBLEM`.
pub fn notify_in_thread(
    services: &Services,
    response: &ValidationResponse,
    settings: &Value,
    now: DateTime<Local>,
) -> anyhow::Result<()> {
    let repository = &services.repositories.notification;
    let last = repository
        .fetch_last_notification_for_a_validation(response.validation_name())?
        .filter(|s| s.is_opened);

    let Some(mut last) = last else {
        if response.status() != Status::Problem {
            return Ok(());
        }
        let content = render_content(response, settings)?;
        let mut thread_ids = BTreeMap::new();
        for notifier in services.notifiers.enabled(settings) {
            let handle = notifier.init_thread(&content, settings)?;
            thread_ids.insert(notifier.name().to_string(), handle);
        }
        let status = NotificationStatus::open(response.validation_name(), thread_ids, now);
        repository.save_last_notification_for_a_validation(&status)?;
        return append_history(services, response, settings, NotificationType::InitThread, now);
    };

    let content = render_content(response, settings)?;
    if response.status() == Status::Normal {
        for notifier in services.notifiers.enabled(settings) {
            if let Some(handle) = last.thread_ids.get(notifier.name()) {
                notifier.close_thread(handle, &content, settings)?;
            }
        }
        last.close(now);
        repository.save_last_notification_for_a_validation(&last)?;
        return append_history(services, response, settings, NotificationType::CloseThread, now);
    }

    let interval = settings
        .pointer("/notification/update_thread_interval")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let elapsed = last.seconds_since_last(now);
    if elapsed < interval {
        debug!(validation = response.validation_name(), elapsed, interval, "thread update suppressed");
        return Ok(());
    }

    debug!(validation = response.validation_name(), "updating notification");
    for notifier in services.notifiers.enabled(settings) {
        if let Some(handle) = last.thread_ids.get(notifier.name()) {
            notifier.update_thread(handle, &content, settings)?;
        }
    }
    last.update(now);
    repository.save_last_notification_for_a_validation(&last)?;
    append_history(services, response, settings, NotificationType::UpdateThread, now)
}

/// Sends one standalone message when the response asks for it via
/// `notification.notify` in its own settings.
pub fn notify_in_single_message(
    services: &Services,
    response: &ValidationResponse,
    settings: &Value,
    now: DateTime<Local>,
) -> anyhow::Result<()> {
    let notify = response
        .settings()
        .and_then(|s| s.pointer("/notification/notify"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !notify {
        return Ok(());
    }

    let content = render_content(response, settings)?;
    for notifier in services.notifiers.enabled(settings) {
        notifier.send_single_message(&content, settings)?;
    }
    append_history(services, response, settings, NotificationType::Single, now)
}

fn append_history(
    services: &Services,
    response: &ValidationResponse,
    settings: &Value,
    notification_type: NotificationType,
    now: DateTime<Local>,
) -> anyhow::Result<()> {
    let add_to_history = settings
        .pointer("/notification/add_to_history")
        .and_then(Value::as_bool)
        .unwrap_or(services.settings.append_notification_to_history);
    if !add_to_history {
        return Ok(());
    }
    services
        .repositories
        .history
        .append_notification(NotificationOccurrence::new(
            response.validation_name(),
            response.details().clone(),
            response.status(),
            notification_type,
            now,
        ))
}
