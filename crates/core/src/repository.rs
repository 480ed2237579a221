//! Persistence boundaries for validation results, thread records and history.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::notification::{NotificationOccurrence, NotificationStatus, NotificationType};
use crate::response::ValidationResponse;
use crate::status::Status;
use crate::util::now;

/// Storage for the latest result of each validation.
pub trait ValidationStore: Send + Sync {
    /// Replaces the stored result for the response's validation.
    fn save_validation_result(&self, response: &ValidationResponse) -> anyhow::Result<()>;
    /// Latest result stored for `name`.
    fn fetch_last_validation_result(&self, name: &str) -> anyhow::Result<Option<ValidationResponse>>;
    /// Latest result of every validation.
    fn fetch_all_validation_results(&self) -> anyhow::Result<Vec<ValidationResponse>>;
}

/// Storage for the live thread record of each validation.
pub trait NotificationRepository: Send + Sync {
    /// Replaces the record for the status's validation.
    fn save_last_notification_for_a_validation(&self, status: &NotificationStatus) -> anyhow::Result<()>;
    /// Record stored for `name`, open or closed.
    fn fetch_last_notification_for_a_validation(&self, name: &str)
        -> anyhow::Result<Option<NotificationStatus>>;
}

/// Exact-match filters over history entries; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilters {
    /// Only entries of this validation.
    pub validation_name: Option<String>,
    /// Only entries with this status.
    pub status: Option<Status>,
    /// Only entries of this kind.
    pub notification_type: Option<NotificationType>,
}

impl HistoryFilters {
    /// True when every set filter matches `occurrence`.
    pub fn matches(&self, occurrence: &NotificationOccurrence) -> bool {
        self.validation_name
            .as_deref()
            .map_or(true, |n| n == occurrence.validation_name)
            && self.status.map_or(true, |s| s == occurrence.status)
            && self
                .notification_type
                .map_or(true, |t| t == occurrence.notification_type)
    }
}

/// Inclusive time window; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interval {
    /// Earliest instant included.
    pub start: Option<DateTime<Local>>,
    /// Latest instant included.
    pub end: Option<DateTime<Local>>,
}

impl Interval {
    /// True when `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Local>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

/// 1-based page of `limit` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Page number, starting at 1.
    pub page: usize,
    /// Entries per page.
    pub limit: usize,
}

/// Append-only log of sent notifications.
pub trait HistoryRepository: Send + Sync {
    /// Records one sent message.
    fn append_notification(&self, occurrence: NotificationOccurrence) -> anyhow::Result<()>;

    /// Entries in `interval` matching `filters`, oldest first.
    fn fetch_notifications(
        &self,
        interval: Interval,
        filters: &HistoryFilters,
        page: Option<Page>,
    ) -> anyhow::Result<Vec<NotificationOccurrence>>;

    /// Number of entries `fetch_notifications` would return unpaged.
    fn count_notifications(&self, interval: Interval, filters: &HistoryFilters) -> anyhow::Result<usize>;
}

/// Front for the configured [`ValidationStore`]; owns the `last_execution` stamp.
#[derive(Clone)]
pub struct ValidationRepository {
    store: Arc<dyn ValidationStore>,
}

impl ValidationRepository {
    /// Front over `store`.
    pub fn new(store: Arc<dyn ValidationStore>) -> Self {
        Self { store }
    }

    /// Stamps `last_execution` with the current time and stores the response.
    pub fn save_validation_result(&self, response: &ValidationResponse) -> anyhow::Result<()> {
        self.save_validation_result_at(response, now())
    }

    /// Like [`ValidationRepository::save_validation_result`] with an explicit execution time.
    pub fn save_validation_result_at(
        &self,
        response: &ValidationResponse,
        at: DateTime<Local>,
    ) -> anyhow::Result<()> {
        let mut stamped = response.clone();
        stamped.set_last_execution(at);
        self.store.save_validation_result(&stamped)
    }

    /// Latest result stored for `name`.
    pub fn fetch_last_validation_result(&self, name: &str) -> anyhow::Result<Option<ValidationResponse>> {
        self.store.fetch_last_validation_result(name)
    }

    /// Latest result of every validation.
    pub fn fetch_all_validation_results(&self) -> anyhow::Result<Vec<ValidationResponse>> {
        self.store.fetch_all_validation_results()
    }
}

impl std::fmt::Debug for ValidationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ValidationRepository")
    }
}

/// The three repositories resolved for this process.
#[derive(Clone)]
pub struct Repositories {
    /// Latest validation results.
    pub validation: ValidationRepository,
    /// Live thread records.
    pub notification: Arc<dyn NotificationRepository>,
    /// Notification history.
    pub history: Arc<dyn HistoryRepository>,
}

impl Repositories {
    /// All three repositories backed by memory.
    pub fn in_memory() -> Self {
        use crate::memory::{MemoryHistoryRepository, MemoryNotificationRepository, MemoryValidationStore};
        Self {
            validation: ValidationRepository::new(Arc::new(MemoryValidationStore::new())),
            notification: Arc::new(MemoryNotificationRepository::new()),
            history: Arc::new(MemoryHistoryRepository::new()),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
