//! In-memory repository implementations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;

use crate::notification::{NotificationOccurrence, NotificationStatus};
use crate::repository::{
    HistoryFilters, HistoryRepository, Interval, NotificationRepository, Page, ValidationStore,
};
use crate::response::ValidationResponse;

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> anyhow::Result<MutexGuard<'a, T>> {
    m.lock().map_err(|_| anyhow!("{what} lock poisoned"))
}

/// In-memory validation results. Not durable; the last write wins.
#[derive(Debug, Default)]
pub struct MemoryValidationStore {
    results: Mutex<BTreeMap<String, ValidationResponse>>,
}

impl MemoryValidationStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValidationStore for MemoryValidationStore {
    fn save_validation_result(&self, response: &ValidationResponse) -> anyhow::Result<()> {
        lock(&self.results, "validation results")?
            .insert(response.validation_name().to_string(), response.clone());
        Ok(())
    }

    fn fetch_last_validation_result(&self, name: &str) -> anyhow::Result<Option<ValidationResponse>> {
        Ok(lock(&self.results, "validation results")?.get(name).cloned())
    }

    fn fetch_all_validation_results(&self) -> anyhow::Result<Vec<ValidationResponse>> {
        Ok(lock(&self.results, "validation results")?.values().cloned().collect())
    }
}

/// In-memory thread records, one per validation.
#[derive(Debug, Default)]
pub struct MemoryNotificationRepository {
    statuses: Mutex<BTreeMap<String, NotificationStatus>>,
}

impl MemoryNotificationRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationRepository for MemoryNotificationRepository {
    fn save_last_notification_for_a_validation(&self, status: &NotificationStatus) -> anyhow::Result<()> {
        lock(&self.statuses, "notification statuses")?
            .insert(status.validation_name.clone(), status.clone());
        Ok(())
    }

    fn fetch_last_notification_for_a_validation(
        &self,
        name: &str,
    ) -> anyhow::Result<Option<NotificationStatus>> {
        Ok(lock(&self.statuses, "notification statuses")?.get(name).cloned())
    }
}

/// In-memory append-only notification history.
#[derive(Debug, Default)]
pub struct MemoryHistoryRepository {
    entries: Mutex<Vec<NotificationOccurrence>>,
}

impl MemoryHistoryRepository {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryRepository for MemoryHistoryRepository {
    fn append_notification(&self, occurrence: NotificationOccurrence) -> anyhow::Result<()> {
        lock(&self.entries, "history")?.push(occurrence);
        Ok(())
    }

    fn fetch_notifications(
        &self,
        interval: Interval,
        filters: &HistoryFilters,
        page: Option<Page>,
    ) -> anyhow::Result<Vec<NotificationOccurrence>> {
        let entries = lock(&self.entries, "history")?;
        let matching = entries
            .iter()
            .filter(|o| interval.contains(o.created_at) && filters.matches(o))
            .cloned();
        Ok(match page {
            Some(Page { page, limit }) => matching
                .skip(page.saturating_sub(1) * limit)
                .take(limit)
                .collect(),
            None => matching.collect(),
        })
    }

    fn count_notifications(&self, interval: Interval, filters: &HistoryFilters) -> anyhow::Result<usize> {
        let entries = lock(&self.entries, "history")?;
        Ok(entries
            .iter()
            .filter(|o| interval.contains(o.created_at) && filters.matches(o))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;
    use crate::repository::ValidationRepository;
    use crate::status::Status;
    use chrono::{Duration, Local, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn validation_repository_stamps_last_execution() {
        let repo = ValidationRepository::new(Arc::new(MemoryValidationStore::new()));
        let mut r = ValidationResponse::new(Status::Warning, json!({}));
        r.set_validation_name("disk");
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        repo.save_validation_result_at(&r, at).unwrap();

        let stored = repo.fetch_last_validation_result("disk").unwrap().unwrap();
        assert_eq!(stored.last_execution(), Some(at));
        assert_eq!(stored.status(), Status::Warning);
        assert!(repo.fetch_last_validation_result("other").unwrap().is_none());
        assert_eq!(repo.fetch_all_validation_results().unwrap().len(), 1);
    }

    #[test]
    fn notification_status_is_replaced_per_validation() {
        let repo = MemoryNotificationRepository::new();
        let t0 = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut s = NotificationStatus::open("disk", BTreeMap::new(), t0);
        repo.save_last_notification_for_a_validation(&s).unwrap();
        s.close(t0 + Duration::minutes(1));
        repo.save_last_notification_for_a_validation(&s).unwrap();
        let stored = repo.fetch_last_notification_for_a_validation("disk").unwrap().unwrap();
        assert!(!stored.is_opened);
    }

    #[test]
    fn history_filters_window_and_pages() {
        let repo = MemoryHistoryRepository::new();
        let t0 = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for i in 0..5 {
            let name = if i % 2 == 0 { "disk" } else { "cpu" };
            repo.append_notification(NotificationOccurrence::new(
                name,
                json!({"i": i}),
                Status::Problem,
                NotificationType::UpdateThread,
                t0 + Duration::minutes(i),
            ))
            .unwrap();
        }

        let disk = HistoryFilters {
            validation_name: Some("disk".into()),
            ..Default::default()
        };
        assert_eq!(repo.count_notifications(Interval::default(), &disk).unwrap(), 3);

        let window = Interval {
            start: Some(t0 + Duration::minutes(1)),
            end: Some(t0 + Duration::minutes(3)),
        };
        assert_eq!(repo.count_notifications(window, &HistoryFilters::default()).unwrap(), 3);

        let second_page = repo
            .fetch_notifications(Interval::default(), &HistoryFilters::default(), Some(Page { page: 2, limit: 2 }))
            .unwrap();
        let seen: Vec<i64> = second_page.iter().map(|o| o.details["i"].as_i64().unwrap()).collect();
        assert_eq!(seen, vec![2, 3]);

        let single = HistoryFilters {
            notification_type: Some(NotificationType::Single),
            ..Default::default()
        };
        assert!(repo
            .fetch_notifications(Interval::default(), &single, None)
            .unwrap()
            .is_empty());
    }
}
