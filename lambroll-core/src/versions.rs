//! Published versions, the aliases pointing at them, and which of them may
//! be deleted.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub const VERSION_LATEST: &str = "$LATEST";
pub const DEFAULT_ALIAS: &str = "current";

const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Parse the service's `LastModified` timestamp, e.g.
/// `2024-03-01T12:00:00.000+0000`.
pub fn parse_last_modified(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, LAST_MODIFIED_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .with_context(|| format!("invalid LastModified timestamp {:?}", s))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub last_modified: DateTime<FixedOffset>,
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasRecord {
    pub name: String,
    pub function_version: String,
    /// Weighted routing to secondary versions, if any.
    pub additional_version_weights: BTreeMap<String, f64>,
}

impl AliasRecord {
    pub fn pointing_at(name: &str, version: &str) -> Self {
        AliasRecord {
            name: name.to_string(),
            function_version: version.to_string(),
            additional_version_weights: BTreeMap::new(),
        }
    }
}

/// version -> names of aliases that route any traffic to it
pub type AliasReferences = BTreeMap<String, Vec<String>>;

pub fn alias_references(aliases: &[AliasRecord]) -> AliasReferences {
    let mut refs = AliasReferences::new();
    let mut add = |version: &str, alias: &str| {
        let names = refs.entry(version.to_string()).or_default();
        if !names.iter().any(|n| n == alias) {
            names.push(alias.to_string());
        }
    };
    for alias in aliases {
        add(&alias.function_version, &alias.name);
        for version in alias.additional_version_weights.keys() {
            add(version, &alias.name);
        }
    }
    refs
}

/// Numeric order for published versions; anything else sorts after, by text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn published(versions: &[VersionInfo]) -> impl Iterator<Item = &VersionInfo> {
    versions.iter().filter(|v| v.version != VERSION_LATEST)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionRecord {
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub last_modified: DateTime<FixedOffset>,
    pub runtime: String,
}

/// Published versions in ascending order, annotated with their aliases.
pub fn version_records(versions: &[VersionInfo], refs: &AliasReferences) -> Vec<VersionRecord> {
    let mut records: Vec<VersionRecord> = published(versions)
        .map(|v| VersionRecord {
            version: v.version.clone(),
            aliases: refs.get(&v.version).cloned().unwrap_or_default(),
            last_modified: v.last_modified,
            runtime: v.runtime.clone().unwrap_or_default(),
        })
        .collect();
    records.sort_by(|a, b| compare_versions(&a.version, &b.version));
    records
}

/// The greatest published version below `current`.
pub fn previous_version(versions: &[VersionInfo], current: &str) -> Option<String> {
    published(versions)
        .filter(|v| compare_versions(&v.version, current) == Ordering::Less)
        .max_by(|a, b| compare_versions(&a.version, &b.version))
        .map(|v| v.version.clone())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Newest versions, kept regardless of aliases.
    pub retained: Vec<String>,
    /// Deletion order, oldest first.
    pub delete: Vec<String>,
    /// Would be deleted, but an alias still routes traffic to them.
    pub skipped: Vec<(String, Vec<String>)>,
}

/// Keep the `keep` most recently modified versions and schedule the rest
/// for deletion, never touching `$LATEST` or a version an alias refers to.
pub fn plan_prune(versions: &[VersionInfo], refs: &AliasReferences, keep: usize) -> PrunePlan {
    let mut newest_first: Vec<&VersionInfo> = published(versions).collect();
    newest_first.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| compare_versions(&b.version, &a.version))
    });
    let mut plan = PrunePlan::default();
    for (i, v) in newest_first.iter().enumerate() {
        if i < keep {
            plan.retained.push(v.version.clone());
        }
    }
    for v in newest_first.iter().skip(keep).rev() {
        match refs.get(&v.version) {
            Some(aliases) if !aliases.is_empty() => {
                plan.skipped.push((v.version.clone(), aliases.clone()))
            }
            _ => plan.delete.push(v.version.clone()),
        }
    }
    plan
}
