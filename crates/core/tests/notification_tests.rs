//! Thread state machine and single message behaviour against recording notifiers.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, TimeZone};
use serde_json::{json, Value};
use watchpost_core::notification::{
    notify_in_single_message, notify_in_thread, Content, NotificationStatus, NotificationType,
    Notifier, Notifiers,
};
use watchpost_core::repository::{HistoryFilters, Interval, Repositories};
use watchpost_core::{Services, Settings, Status, ValidationResponse};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Single(Vec<String>),
    Init(Vec<String>),
    Update(Value, Vec<String>),
    Close(Value, Vec<String>),
}

struct RecordingNotifier {
    name: String,
    calls: Mutex<Vec<Call>>,
}

impl RecordingNotifier {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_single_message(&self, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call::Single(content.messages().to_vec()));
        Ok(())
    }

    fn init_thread(&self, content: &Content, _settings: &Value) -> anyhow::Result<Value> {
        self.calls.lock().unwrap().push(Call::Init(content.messages().to_vec()));
        Ok(json!(format!("{}-thread", self.name)))
    }

    fn update_thread(&self, handle: &Value, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Update(handle.clone(), content.messages().to_vec()));
        Ok(())
    }

    fn close_thread(&self, handle: &Value, content: &Content, _settings: &Value) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Close(handle.clone(), content.messages().to_vec()));
        Ok(())
    }
}

struct Fixture {
    services: Services,
    primary: Arc<RecordingNotifier>,
    secondary: Arc<RecordingNotifier>,
}

fn fixture(append_to_history: bool) -> Fixture {
    let primary = RecordingNotifier::new("primary");
    let secondary = RecordingNotifier::new("secondary");
    let first: Arc<dyn Notifier> = primary.clone();
    let second: Arc<dyn Notifier> = secondary.clone();
    let settings = Settings {
        append_notification_to_history: append_to_history,
        ..Settings::default()
    };
    Fixture {
        services: Services::new(settings, Repositories::in_memory(), Notifiers::new(vec![first, second])),
        primary,
        secondary,
    }
}

fn response(status: Status) -> ValidationResponse {
    let mut r = ValidationResponse::new(status, json!({"used": 91}));
    r.set_validation_name("disk");
    r
}

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn stored(f: &Fixture) -> Option<NotificationStatus> {
    f.services
        .repositories
        .notification
        .fetch_last_notification_for_a_validation("disk")
        .unwrap()
}

fn history(f: &Fixture) -> Vec<NotificationType> {
    f.services
        .repositories
        .history
        .fetch_notifications(Interval::default(), &HistoryFilters::default(), None)
        .unwrap()
        .into_iter()
        .map(|o| o.notification_type)
        .collect()
}

#[test]
fn test_non_problem_without_thread_is_a_no_op() {
    let f = fixture(true);
    for status in [Status::Normal, Status::Warning] {
        notify_in_thread(&f.services, &response(status), &json!({}), t0()).unwrap();
    }
    assert!(stored(&f).is_none());
    assert!(f.primary.calls().is_empty());
    assert!(history(&f).is_empty());
}

#[test]
fn test_problem_opens_thread_on_every_notifier() {
    let f = fixture(true);
    notify_in_thread(&f.services, &response(Status::Problem), &json!({}), t0()).unwrap();

    let status = stored(&f).unwrap();
    assert!(status.is_opened);
    assert_eq!(status.last_notification, t0());
    assert_eq!(status.thread_ids["primary"], json!("primary-thread"));
    assert_eq!(status.thread_ids["secondary"], json!("secondary-thread"));
    assert_eq!(f.primary.calls(), vec![Call::Init(vec![r#"{"used":91}"#.into()])]);
    assert_eq!(f.secondary.calls().len(), 1);
    assert_eq!(history(&f), vec![NotificationType::InitThread]);
}

#[test]
fn test_normal_closes_open_thread() {
    let f = fixture(true);
    notify_in_thread(&f.services, &response(Status::Problem), &json!({}), t0()).unwrap();
    let later = t0() + Duration::minutes(5);
    notify_in_thread(&f.services, &response(Status::Normal), &json!({}), later).unwrap();

    let status = stored(&f).unwrap();
    assert!(!status.is_opened);
    assert_eq!(status.last_notification, later);
    assert!(matches!(
        f.primary.calls().last(),
        Some(Call::Close(handle, _)) if *handle == json!("primary-thread")
    ));
    assert_eq!(history(&f), vec![NotificationType::InitThread, NotificationType::CloseThread]);

    // closed threads behave like absent ones
    notify_in_thread(&f.services, &response(Status::Normal), &json!({}), later).unwrap();
    assert_eq!(f.primary.calls().len(), 2);
    notify_in_thread(&f.services, &response(Status::Problem), &json!({}), later).unwrap();
    assert!(matches!(f.primary.calls().last(), Some(Call::Init(_))));
    assert!(stored(&f).unwrap().is_opened);
}

#[test]
fn test_update_respects_interval() {
    let f = fixture(false);
    let settings = json!({"notification": {"update_thread_interval": 120}});
    notify_in_thread(&f.services, &response(Status::Problem), &settings, t0()).unwrap();
    let opened = stored(&f).unwrap();

    notify_in_thread(
        &f.services,
        &response(Status::Problem),
        &settings,
        t0() + Duration::seconds(60),
    )
    .unwrap();
    assert_eq!(stored(&f).unwrap(), opened);
    assert_eq!(f.primary.calls().len(), 1);

    let later = t0() + Duration::seconds(120);
    notify_in_thread(&f.services, &response(Status::Warning), &settings, later).unwrap();
    assert_eq!(stored(&f).unwrap().last_notification, later);
    assert!(matches!(f.primary.calls().last(), Some(Call::Update(_, _))));
    assert!(history(&f).is_empty());
}

#[test]
fn test_disabled_notifier_gets_no_thread() {
    let f = fixture(false);
    let settings = json!({"notification": {"disabled": ["secondary"]}});
    notify_in_thread(&f.services, &response(Status::Problem), &settings, t0()).unwrap();
    let status = stored(&f).unwrap();
    assert_eq!(status.thread_ids.len(), 1);
    assert!(f.secondary.calls().is_empty());

    // a notifier enabled later has no handle and is skipped on close
    notify_in_thread(&f.services, &response(Status::Normal), &json!({}), t0()).unwrap();
    assert!(f.secondary.calls().is_empty());
    assert_eq!(f.primary.calls().len(), 2);
}

#[test]
fn test_single_message_requires_notify_flag() {
    let f = fixture(false);
    let settings = json!({"notification": {"template": "{{ host }} is at {{ used }}%", "add_to_history": true}});
    notify_in_single_message(&f.services, &response(Status::Problem), &settings, t0()).unwrap();
    assert!(f.primary.calls().is_empty());

    let flagged = response(Status::Problem).with_settings(json!({
        "notification": {"notify": true, "data": [{"host": "db1"}, {"host": "db2"}]}
    }));
    notify_in_single_message(&f.services, &flagged, &settings, t0()).unwrap();
    assert_eq!(
        f.primary.calls(),
        vec![Call::Single(vec!["db1 is at 91%".into(), "db2 is at 91%".into()])]
    );
    assert_eq!(history(&f), vec![NotificationType::Single]);
}
