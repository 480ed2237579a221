use std::slice;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::response::ValidationResponse;

/// Rendered notification payload: one message, or one per `notification.data` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// A single message.
    Text(String),
    /// One message per data entry.
    Messages(Vec<String>),
}

impl Content {
    /// The messages to deliver, in order.
    pub fn messages(&self) -> &[String] {
        match self {
            Content::Text(text) => slice::from_ref(text),
            Content::Messages(messages) => messages,
        }
    }
}

/// Template syntax errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{` without a matching `}}`.
    #[error("unclosed placeholder starting at byte {offset}")]
    Unclosed { offset: usize },
    /// `{{ }}` naming nothing.
    #[error("empty placeholder at byte {offset}")]
    Empty { offset: usize },
}

/// Builds the notification content for a response.
///
/// With a `notification.template` (or `notification.template_error` when the
/// details ask for the error template) in the validation settings, the template
/// is rendered against the details merged with the response's
/// `notification.data`. Without one, the content is the details as JSON.
pub fn render_content(response: &ValidationResponse, settings: &Value) -> Result<Content, TemplateError> {
    let origin = if response.detail_flag("use_error_template") {
        "template_error"
    } else {
        "template"
    };
    let template = settings
        .get("notification")
        .and_then(|n| n.get(origin))
        .and_then(Value::as_str);
    let Some(template) = template else {
        return Ok(Content::Text(response.details().to_string()));
    };

    let data = response
        .settings()
        .and_then(|s| s.pointer("/notification/data"));
    match data {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| render_template(template, &merge(response.details(), Some(entry))))
            .collect::<Result<Vec<_>, _>>()
            .map(Content::Messages),
        other => render_template(template, &merge(response.details(), other)).map(Content::Text),
    }
}

fn merge(details: &Value, data: Option<&Value>) -> Value {
    let mut merged = details.as_object().cloned().unwrap_or_else(Map::new);
    if let Some(Value::Object(extra)) = data {
        for (k, v) in extra {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

/// Substitutes `{{ path }}` placeholders with values from `context`.
///
/// Paths are dot separated object keys or array indices. Missing values render
/// as an empty string, strings render without quotes and everything else as JSON.
pub fn render_template(template: &str, context: &Value) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut pos = 0;

    while let Some(start) = template[pos..].find("{{") {
        let open = pos + start;
        output.push_str(&template[pos..open]);
        let close = template[open + 2..]
            .find("}}")
            .ok_or(TemplateError::Unclosed { offset: open })?;
        let expr = template[open + 2..open + 2 + close].trim();
        if expr.is_empty() {
            return Err(TemplateError::Empty { offset: open });
        }
        match resolve(context, expr) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => output.push_str(s),
            Some(other) => output.push_str(&other.to_string()),
        }
        pos = open + 2 + close + 2;
    }
    output.push_str(&template[pos..]);
    Ok(output)
}

fn resolve<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, part| match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
