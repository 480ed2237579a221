//! Validation registration and the execution wrapper.
//!
//! Every registered validation is stored as a [`ValidationRef`]: the user body
//! composed once with run filtering, action dispatch and failure capture. The
//! wrapper never propagates a failure; it turns it into a `PROBLEM` response
//! and runs the error actions instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::response::ValidationResponse;
use crate::status::Status;
use crate::util::panic_message;

/// A user validation body.
pub type ValidationFn = Arc<dyn Fn() -> anyhow::Result<ValidationResponse> + Send + Sync>;

type ActionFn = dyn Fn(&ValidationResponse, &Value) -> anyhow::Result<()> + Send + Sync;

/// Callback run after a validation, invoked for its side effect with
/// `(response, settings)`.
#[derive(Clone)]
pub struct Action {
    name: Arc<str>,
    func: Arc<ActionFn>,
}

impl Action {
    /// Action called `name` running `func`.
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&ValidationResponse, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name the action is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the action against a finished response and the validation's settings.
    pub fn call(&self, response: &ValidationResponse, settings: &Value) -> anyhow::Result<()> {
        (self.func)(response, settings)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.name).finish()
    }
}

/// The wrapped, invokable form of a registered validation.
///
/// Returns `None` when the run filter excludes the validation; otherwise the
/// response produced by the body, or the one synthesized from its failure.
#[derive(Clone)]
pub struct ValidationRef {
    name: Arc<str>,
    run: Arc<dyn Fn() -> Option<ValidationResponse> + Send + Sync>,
}

impl ValidationRef {
    /// Name of the wrapped validation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the validation through the filter, its actions and error recovery.
    pub fn run(&self) -> Option<ValidationResponse> {
        (self.run)()
    }
}

impl fmt::Debug for ValidationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValidationRef").field(&self.name).finish()
    }
}

/// Process-wide allow and skip lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// When non-empty, only these names run.
    pub run_only: Vec<String>,
    /// Names that never run.
    pub skip: Vec<String>,
}

impl RunFilter {
    /// Filter from an allow list and a skip list.
    pub fn new(run_only: Vec<String>, skip: Vec<String>) -> Self {
        Self { run_only, skip }
    }

    fn admits(&self, name: &str) -> bool {
        if !self.run_only.is_empty() && !self.run_only.iter().any(|n| n == name) {
            info!(validation = %name, "validation not in run-only list");
            return false;
        }
        if self.skip.iter().any(|n| n == name) {
            info!(validation = %name, "validation in skip list");
            return false;
        }
        true
    }
}

/// Definition handed to [`Registry::register`].
pub struct ValidationDef {
    name: String,
    body: ValidationFn,
    description: Option<String>,
    group: Option<String>,
    actions: Vec<Action>,
    actions_on_error: Vec<Action>,
    schedule: Value,
    settings: Value,
}

impl ValidationDef {
    /// Definition named `name` with `body` and no actions, schedule or settings.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> anyhow::Result<ValidationResponse> + Send + Sync + 'static,
    {
        Self::from_fn(name, Arc::new(body))
    }

    /// Like [`ValidationDef::new`] with an already shared body.
    pub fn from_fn(name: impl Into<String>, body: ValidationFn) -> Self {
        Self {
            name: name.into(),
            body,
            description: None,
            group: None,
            actions: Vec::new(),
            actions_on_error: Vec::new(),
            schedule: Value::Null,
            settings: Value::Null,
        }
    }

    /// Human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Places the validation in a named group; ungrouped ones report under [`DEFAULT_GROUP`].
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Actions run after every successful invocation.
    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Actions run after a failed invocation.
    pub fn actions_on_error(mut self, actions: Vec<Action>) -> Self {
        self.actions_on_error = actions;
        self
    }

    /// Cadence descriptor; see [`crate::schedule::Cadence`].
    pub fn schedule(mut self, schedule: Value) -> Self {
        self.schedule = schedule;
        self
    }

    /// Validation-specific settings passed to every action.
    pub fn settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }
}

/// Group of validations registered without one.
pub const DEFAULT_GROUP: &str = "default";

/// Registration entry kept per validation name.
#[derive(Debug, Clone)]
pub struct ValidationEntry {
    /// Wrapped, invokable form.
    pub reference: ValidationRef,
    /// Human-readable description.
    pub description: Option<String>,
    /// Group given at registration.
    pub group: Option<String>,
    /// Actions run after a successful invocation.
    pub actions: Vec<Action>,
    /// Actions run after a failed invocation.
    pub actions_on_error: Vec<Action>,
    /// Cadence descriptor as registered.
    pub schedule: Value,
    /// Validation-specific settings.
    pub settings: Value,
}

impl ValidationEntry {
    /// The group this validation reports under.
    pub fn group_name(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP)
    }
}

/// Validations keyed by name. Registering an existing name replaces it.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, ValidationEntry>,
    loaded_modules: BTreeSet<String>,
    filter: Arc<RunFilter>,
}

impl Registry {
    /// Empty registry applying `filter` to every validation it wraps.
    pub fn new(filter: RunFilter) -> Self {
        Self {
            entries: BTreeMap::new(),
            loaded_modules: BTreeSet::new(),
            filter: Arc::new(filter),
        }
    }

    /// The run filter shared by wrapped validations.
    pub fn filter(&self) -> &RunFilter {
        &self.filter
    }

    /// Wraps the definition's body and stores the entry, returning the wrapped form.
    pub fn register(&mut self, def: ValidationDef) -> ValidationRef {
        let reference = wrap(&def, Arc::clone(&self.filter));
        if self.entries.contains_key(&def.name) {
            debug!(validation = %def.name, "redefining validation");
        } else {
            debug!(validation = %def.name, "registered validation");
        }
        self.entries.insert(
            def.name,
            ValidationEntry {
                reference: reference.clone(),
                description: def.description,
                group: def.group,
                actions: def.actions,
                actions_on_error: def.actions_on_error,
                schedule: def.schedule,
                settings: def.settings,
            },
        );
        reference
    }

    /// Entry registered as `name`.
    pub fn get(&self, name: &str) -> Option<&ValidationEntry> {
        self.entries.get(name)
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ValidationEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered validations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry and forgets which code modules were loaded.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.loaded_modules.clear();
    }

    /// Records a code module as loaded; false when it already was.
    pub(crate) fn mark_module_loaded(&mut self, module: &str) -> bool {
        self.loaded_modules.insert(module.to_string())
    }
}

struct Failure {
    message: String,
    traceback: String,
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            traceback: format!("{err:?}"),
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Failure> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(Failure::from(e)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            Err(Failure {
                traceback: format!("panicked: {message}"),
                message,
            })
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OnException {
    #[serde(default)]
    result: Option<ExceptionResult>,
    #[serde(default)]
    append_traceback_on_details: bool,
    #[serde(default)]
    rerun_actions: bool,
}

#[derive(Debug, Deserialize)]
struct ExceptionResult {
    status: Status,
    #[serde(default)]
    details: Value,
}

fn on_exception(name: &str, settings: &Value) -> Option<OnException> {
    let raw = settings.get("on_exception")?;
    match serde_json::from_value::<OnException>(raw.clone()) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(validation = %name, error = %e, "ignoring malformed on_exception settings");
            None
        }
    }
}

fn wrap(def: &ValidationDef, filter: Arc<RunFilter>) -> ValidationRef {
    let name: Arc<str> = Arc::from(def.name.as_str());
    let body = Arc::clone(&def.body);
    let actions: Arc<[Action]> = def.actions.clone().into();
    let actions_on_error: Arc<[Action]> = def.actions_on_error.clone().into();
    let settings = Arc::new(def.settings.clone());

    let run_name = Arc::clone(&name);
    let run = move || -> Option<ValidationResponse> {
        if !filter.admits(&run_name) {
            return None;
        }
        let outcome = guarded(|| {
            let mut response = body()?;
            response.set_validation_name(&*run_name);
            dispatch(&actions, &response, &settings)?;
            Ok(response)
        });
        match outcome {
            Ok(response) => Some(response),
            Err(failure) => Some(recover(
                &run_name,
                failure,
                &actions,
                &actions_on_error,
                &settings,
            )),
        }
    };

    ValidationRef {
        name,
        run: Arc::new(run),
    }
}

fn dispatch(actions: &[Action], response: &ValidationResponse, settings: &Value) -> anyhow::Result<()> {
    for action in actions {
        info!(action = action.name(), result = %response, "executing action");
        action.call(response, settings)?;
    }
    Ok(())
}

fn recover(
    name: &str,
    failure: Failure,
    actions: &[Action],
    actions_on_error: &[Action],
    settings: &Value,
) -> ValidationResponse {
    error!(
        validation = %name,
        error = %failure.message,
        traceback = %failure.traceback,
        "validation error"
    );

    let on_exception = on_exception(name, settings);
    let mut response = match on_exception.as_ref().and_then(|c| c.result.as_ref()) {
        Some(result) => ValidationResponse::new(result.status, result.details.clone()),
        None => ValidationResponse::new(
            Status::Problem,
            json!({
                "exception": failure.message.clone(),
                "traceback": failure.traceback.clone(),
                "use_error_template": true,
            }),
        ),
    };
    response.set_validation_name(name);

    if let Some(cfg) = &on_exception {
        if cfg.append_traceback_on_details {
            let details = response.details_mut();
            if !details.is_object() {
                *details = json!({});
            }
            if let Some(details) = details.as_object_mut() {
                details.insert("traceback".into(), Value::from(failure.traceback.clone()));
            }
        }
        if cfg.rerun_actions {
            if let Err(f) = guarded(|| dispatch(actions, &response, settings)) {
                error!(validation = %name, error = %f.message, traceback = %f.traceback, "action failed while rerunning on exception");
            }
        }
    }

    for action in actions_on_error {
        info!(action = action.name(), result = %response, "executing error action");
        if let Err(f) = guarded(|| action.call(&response, settings)) {
            error!(
                validation = %name,
                action = action.name(),
                error = %f.message,
                traceback = %f.traceback,
                "error action failed; skipping remaining error actions"
            );
            break;
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Action, Arc<Mutex<Vec<ValidationResponse>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let action = Action::new("record", move |r: &ValidationResponse, _s: &Value| {
            sink.lock().unwrap().push(r.clone());
            Ok(())
        });
        (action, seen)
    }

    fn normal() -> anyhow::Result<ValidationResponse> {
        Ok(ValidationResponse::new(Status::Normal, json!({})))
    }

    #[test]
    fn stamps_name_and_runs_actions_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&order), Arc::clone(&order));
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("simple", normal).actions(vec![
                Action::new("first", move |_r: &ValidationResponse, _s: &Value| {
                    a.lock().unwrap().push("first");
                    Ok(())
                }),
                Action::new("second", move |_r: &ValidationResponse, _s: &Value| {
                    b.lock().unwrap().push("second");
                    Ok(())
                }),
            ]),
        );
        let response = r.run().unwrap();
        assert_eq!(response.validation_name(), "simple");
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn actions_receive_registered_settings() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let sink = Arc::clone(&seen);
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("with_settings", normal)
                .settings(json!({"threshold": 3}))
                .actions(vec![Action::new("capture", move |_r: &ValidationResponse, s: &Value| {
                    *sink.lock().unwrap() = s.clone();
                    Ok(())
                })]),
        );
        r.run();
        assert_eq!(*seen.lock().unwrap(), json!({"threshold": 3}));
    }

    #[test]
    fn run_only_list_excludes_other_validations() {
        let (action, seen) = recorder();
        let mut registry = Registry::new(RunFilter::new(vec!["other".into()], vec![]));
        let r = registry.register(ValidationDef::new("simple", normal).actions(vec![action]));
        assert!(r.run().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn skip_list_excludes_named_validation() {
        let (action, seen) = recorder();
        let mut registry = Registry::new(RunFilter::new(vec![], vec!["simple".into()]));
        let skipped = registry.register(ValidationDef::new("simple", normal).actions(vec![action.clone()]));
        let kept = registry.register(ValidationDef::new("kept", normal).actions(vec![action]));
        assert!(skipped.run().is_none());
        assert!(kept.run().is_some());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_body_becomes_problem_and_runs_error_actions_once() {
        let (action, ran) = recorder();
        let (on_error, errors) = recorder();
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("broken", || anyhow::bail!("boom"))
                .actions(vec![action])
                .actions_on_error(vec![on_error]),
        );
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Problem);
        assert_eq!(response.details()["exception"], "boom");
        assert_eq!(response.details()["use_error_template"], true);
        assert_eq!(response.validation_name(), "broken");
        assert!(ran.lock().unwrap().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], response);
    }

    #[test]
    fn failing_action_is_treated_like_failing_body() {
        let (on_error, errors) = recorder();
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("bad_action", normal)
                .actions(vec![Action::new("explode", |_r: &ValidationResponse, _s: &Value| {
                    anyhow::bail!("action exploded")
                })])
                .actions_on_error(vec![on_error]),
        );
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Problem);
        assert_eq!(response.details()["exception"], "action exploded");
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn panicking_body_is_captured() {
        let mut registry = Registry::default();
        let r = registry.register(ValidationDef::new("panics", || -> anyhow::Result<ValidationResponse> {
            panic!("kaboom")
        }));
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Problem);
        assert_eq!(response.details()["exception"], "kaboom");
    }

    #[test]
    fn invalid_status_inside_body_is_converted() {
        let mut registry = Registry::default();
        let r = registry.register(ValidationDef::new("invalid", || {
            Ok(ValidationResponse::from_status_str("INVALID", json!({}))?)
        }));
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Problem);
        assert_eq!(response.details()["exception"], "INVALID is not a valid status");
    }

    #[test]
    fn failing_error_action_stops_remaining_error_actions() {
        let (last, seen) = recorder();
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("broken", || anyhow::bail!("boom")).actions_on_error(vec![
                Action::new("fails", |_r: &ValidationResponse, _s: &Value| anyhow::bail!("nope")),
                last,
            ]),
        );
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Problem);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn on_exception_settings_replace_result_and_rerun_actions() {
        let (action, ran) = recorder();
        let mut registry = Registry::default();
        let r = registry.register(
            ValidationDef::new("custom", || anyhow::bail!("error"))
                .actions(vec![action])
                .settings(json!({
                    "on_exception": {
                        "result": {"status": "WARNING", "details": {"note": "degraded"}},
                        "append_traceback_on_details": true,
                        "rerun_actions": true
                    }
                })),
        );
        let response = r.run().unwrap();
        assert_eq!(response.status(), Status::Warning);
        assert_eq!(response.details()["note"], "degraded");
        assert!(response.details().get("traceback").is_some());
        assert_eq!(ran.lock().unwrap().len(), 1);
        assert_eq!(ran.lock().unwrap()[0].validation_name(), "custom");
    }

    #[test]
    fn reregistering_overwrites_entry() {
        let mut registry = Registry::default();
        registry.register(ValidationDef::new("same", normal).description("first"));
        registry.register(ValidationDef::new("same", normal).description("second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("same").unwrap().description.as_deref(), Some("second"));
    }

    #[test]
    fn clear_forgets_entries_and_modules() {
        let mut registry = Registry::default();
        registry.register(ValidationDef::new("a", normal));
        assert!(registry.mark_module_loaded("validations.a_validation"));
        assert!(!registry.mark_module_loaded("validations.a_validation"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.mark_module_loaded("validations.a_validation"));
    }
}
