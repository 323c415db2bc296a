//! Structural comparison of two normalized definitions.
//!
//! Both sides are serialized to JSON, trimmed by the ignore expressions, and
//! compared with [`json_patch::diff`]. The result is rendered as a unified
//! diff-like listing of changed paths.

use std::fmt::{self, Display};

use anyhow::{Context, Result};
use json_patch::PatchOperation;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::normalize::NormalizedDefinition;

const TAGS_MEMBER: &str = "Tags";

/// A JSONPath expression naming members to leave out of the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreQuery {
    expression: String,
}

impl IgnoreQuery {
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let expression = expression.trim();
        let invalid = |message: String| Error::IgnoreExpression {
            expression: expression.to_string(),
            message,
        };
        if !expression.starts_with('$') {
            return Err(invalid("expression must start with '$'".to_string()));
        }
        jsonpath_lib::select(&Value::Object(Map::new()), expression)
            .map_err(|e| invalid(format!("{:?}", e)))?;
        Ok(IgnoreQuery {
            expression: expression.to_string(),
        })
    }

    pub fn parse_all<S: AsRef<str>>(expressions: &[S]) -> Result<Vec<Self>, Error> {
        expressions.iter().map(|e| Self::parse(e.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Remove every member the expression selects.
    pub fn apply(&self, value: Value) -> Result<Value, Error> {
        // jsonpath_lib replaces matches with null rather than removing them.
        let value =
            jsonpath_lib::delete(value, &self.expression).map_err(|e| Error::IgnoreExpression {
                expression: self.expression.clone(),
                message: format!("{:?}", e),
            })?;
        Ok(prune_nulls(value))
    }
}

fn prune_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, prune_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(prune_nulls)
                .collect(),
        ),
        other => other,
    }
}

/// One changed location.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// JSON pointer, or a pseudo-member such as `CodeSha256`.
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffLine {
    From(String),
    To(String),
    Hunk(String),
    Removed(String),
    Added(String),
}

impl Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffLine::From(name) => write!(f, "--- {}", name),
            DiffLine::To(name) => write!(f, "+++ {}", name),
            DiffLine::Hunk(path) => write!(f, "@@ {} @@", path),
            DiffLine::Removed(text) => write!(f, "-{}", text),
            DiffLine::Added(text) => write!(f, "+{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    pub from_name: String,
    pub to_name: String,
    pub changes: Vec<Change>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Lines to print; empty when nothing changed.
    pub fn lines(&self) -> Vec<DiffLine> {
        if self.changes.is_empty() {
            return Vec::new();
        }
        let mut lines = vec![
            DiffLine::From(self.from_name.clone()),
            DiffLine::To(self.to_name.clone()),
        ];
        for change in &self.changes {
            lines.push(DiffLine::Hunk(change.path.clone()));
            if let Some(before) = &change.before {
                lines.extend(render_value(before).into_iter().map(DiffLine::Removed));
            }
            if let Some(after) = &change.after {
                lines.extend(render_value(after).into_iter().map(DiffLine::Added));
            }
        }
        lines
    }
}

fn render_value(value: &Value) -> Vec<String> {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.lines().map(str::to_string).collect()
}

fn to_compared_value(def: &NormalizedDefinition, ignore: &[IgnoreQuery]) -> Result<Value> {
    let mut value = serde_json::to_value(def).context("serializing definition for comparison")?;
    // No tags and an explicitly empty tag set describe the same function.
    if let Value::Object(members) = &mut value {
        if members
            .get(TAGS_MEMBER)
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty)
        {
            members.remove(TAGS_MEMBER);
        }
    }
    for query in ignore {
        value = query.apply(value)?;
    }
    Ok(value)
}

/// Compare `current` (the remote mirror) against `desired` (the local file).
pub fn diff(
    current: &NormalizedDefinition,
    desired: &NormalizedDefinition,
    ignore: &[IgnoreQuery],
    from_name: &str,
    to_name: &str,
) -> Result<DiffResult> {
    let from = to_compared_value(current, ignore)?;
    let to = to_compared_value(desired, ignore)?;
    let patch = json_patch::diff(&from, &to);
    let mut changes = Vec::new();
    for op in patch.0 {
        let change = match op {
            PatchOperation::Add(op) => Change {
                path: op.path.to_string(),
                before: None,
                after: Some(op.value),
            },
            PatchOperation::Remove(op) => {
                let path = op.path.to_string();
                Change {
                    before: from.pointer(&path).cloned(),
                    after: None,
                    path,
                }
            }
            PatchOperation::Replace(op) => {
                let path = op.path.to_string();
                Change {
                    before: from.pointer(&path).cloned(),
                    after: Some(op.value),
                    path,
                }
            }
            // not produced by json_patch::diff
            _ => continue,
        };
        changes.push(change);
    }
    Ok(DiffResult {
        from_name: from_name.to_string(),
        to_name: to_name.to_string(),
        changes,
    })
}

/// Pseudo-change for the archive digest, which is not part of a definition.
pub fn code_digest_diff(current: &str, desired: &str, from_name: &str, to_name: &str) -> DiffResult {
    let changes = if current == desired {
        Vec::new()
    } else {
        vec![Change {
            path: "CodeSha256".to_string(),
            before: Some(Value::String(current.to_string())),
            after: Some(Value::String(desired.to_string())),
        }]
    };
    DiffResult {
        from_name: from_name.to_string(),
        to_name: to_name.to_string(),
        changes,
    }
}
