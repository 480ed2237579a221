//! Call-throughs used by status front ends.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::UnknownValidation;
use crate::registry::Registry;
use crate::repository::ValidationRepository;
use crate::response::ValidationResponse;
use crate::status::{combine_all, Status};

/// How much of the stored results a [`StatusReport`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// Only results that are not `NORMAL`.
    Brief,
    /// Every stored result.
    Complete,
}

/// Combined status over stored results and the results listed for the requested detail.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    /// Worst status over every stored result.
    pub status: Status,
    /// Results listed for the requested detail.
    pub validations: Vec<ValidationResponse>,
}

/// Runs a registered validation now, through the same wrapper the scheduler uses.
pub fn execute_validation(
    registry: &Registry,
    name: &str,
) -> Result<Option<ValidationResponse>, UnknownValidation> {
    let entry = registry
        .get(name)
        .ok_or_else(|| UnknownValidation(name.to_string()))?;
    Ok(entry.reference.run())
}

/// Latest stored result of `name`.
pub fn last_validation_result(
    repository: &ValidationRepository,
    name: &str,
) -> anyhow::Result<Option<ValidationResponse>> {
    repository.fetch_last_validation_result(name)
}

/// Combined status over every stored result, plus the listing for `detail`.
pub fn status_report(repository: &ValidationRepository, detail: Detail) -> anyhow::Result<StatusReport> {
    let results = repository.fetch_all_validation_results()?;
    let status = combine_all(results.iter().map(ValidationResponse::status));
    let validations = match detail {
        Detail::Complete => results,
        Detail::Brief => results
            .into_iter()
            .filter(|r| r.status() != Status::Normal)
            .collect(),
    };
    Ok(StatusReport { status, validations })
}

/// Last-result counts per status.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StateCount {
    /// Members whose last result was `NORMAL`.
    pub normal: usize,
    /// Members whose last result was `WARNING`.
    pub warning: usize,
    /// Members whose last result was `PROBLEM`.
    pub problem: usize,
}

impl StateCount {
    fn record(&mut self, status: Status) {
        match status {
            Status::Normal => self.normal += 1,
            Status::Warning => self.warning += 1,
            Status::Problem => self.problem += 1,
        }
    }
}

/// Status counts of one group.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Group name.
    pub group_name: String,
    /// Identifier of the group, equal to its name.
    #[serde(rename = "groupID")]
    pub group_id: String,
    /// Counts over members with a stored result.
    pub monitors_state_count: StateCount,
}

/// One validation of a group that has a stored result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Monitor {
    /// Validation name, used as identifier.
    pub id: String,
    /// Validation name.
    pub name: String,
    /// Description given at registration.
    pub description: Option<String>,
    /// Status of the last stored result.
    pub status: Status,
    /// The `content` entry of the result's settings, `{}` when absent.
    pub content: Value,
}

/// Members of one group with their last results.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupValidations {
    /// Group name.
    pub group_name: String,
    /// Identifier of the group, equal to its name.
    #[serde(rename = "groupID")]
    pub group_id: String,
    /// Members that have a stored result, in name order.
    pub monitors: Vec<Monitor>,
}

/// Every group known to the registry with the statuses of its members' last results.
///
/// Groups are listed by name; validations never run count towards no status.
pub fn groups_summary(registry: &Registry, repository: &ValidationRepository) -> anyhow::Result<Vec<GroupSummary>> {
    let mut groups: BTreeMap<&str, StateCount> = BTreeMap::new();
    for (name, entry) in registry.entries() {
        let count = groups.entry(entry.group_name()).or_default();
        if let Some(last) = repository.fetch_last_validation_result(name)? {
            count.record(last.status());
        }
    }
    Ok(groups
        .into_iter()
        .map(|(group, count)| GroupSummary {
            group_name: group.to_string(),
            group_id: group.to_string(),
            monitors_state_count: count,
        })
        .collect())
}

/// Members of `group` that have a stored result, in name order.
pub fn group_validations(
    registry: &Registry,
    repository: &ValidationRepository,
    group: &str,
) -> anyhow::Result<GroupValidations> {
    let mut monitors = Vec::new();
    for (name, entry) in registry.entries().filter(|(_, e)| e.group_name() == group) {
        let Some(last) = repository.fetch_last_validation_result(name)? else {
            continue;
        };
        let content = last
            .settings()
            .and_then(|s| s.get("content"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        monitors.push(Monitor {
            id: name.to_string(),
            name: name.to_string(),
            description: entry.description.clone(),
            status: last.status(),
            content,
        });
    }
    Ok(GroupValidations {
        group_name: group.to_string(),
        group_id: group.to_string(),
        monitors,
    })
}
