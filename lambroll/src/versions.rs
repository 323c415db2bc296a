use std::io::Write;

use anyhow::{bail, Context, Result};
use lambroll_core::versions::{
    alias_references, plan_prune, version_records, AliasRecord, AliasReferences, VersionInfo,
    VersionRecord,
};
use lambroll_core::Error;
use lambroll_remote::pagination::collect_all;
use tabled::Tabled;

use crate::application::App;
use crate::options::require;
use crate::output::{write_records, OutputFormat};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Delete old versions, keeping the newest ones
    #[arg(long, requires = "keep_versions")]
    delete: bool,

    /// How many of the newest versions `--delete` keeps
    #[arg(long)]
    keep_versions: Option<usize>,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Last Modified")]
    last_modified: String,
    #[tabled(rename = "Aliases")]
    aliases: String,
    #[tabled(rename = "Runtime")]
    runtime: String,
}

impl From<&VersionRecord> for VersionRow {
    fn from(r: &VersionRecord) -> Self {
        VersionRow {
            version: r.version.clone(),
            last_modified: r.last_modified.to_rfc3339(),
            aliases: r.aliases.join(","),
            runtime: r.runtime.clone(),
        }
    }
}

/// Every version of `name`, `$LATEST` included.
pub(crate) async fn list_versions(app: &App, name: &str) -> Result<Vec<VersionInfo>> {
    collect_all(|marker| app.service.list_versions(name, marker))
        .await
        .with_context(|| format!("listing versions of {}", name))
}

pub(crate) async fn list_aliases(app: &App, name: &str) -> Result<Vec<AliasRecord>> {
    collect_all(|marker| app.service.list_aliases(name, marker))
        .await
        .with_context(|| format!("listing aliases of {}", name))
}

pub(crate) async fn references(app: &App, name: &str) -> Result<AliasReferences> {
    Ok(alias_references(&list_aliases(app, name).await?))
}

#[derive(Debug, Default)]
pub(crate) struct PruneReport {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, anyhow::Error)>,
}

/// Delete all but the `keep` newest versions that no alias refers to.
///
/// A failed deletion does not stop the others; the result is an error only
/// when every attempted deletion failed.
pub(crate) async fn prune(app: &App, name: &str, keep: usize) -> Result<PruneReport> {
    let versions = list_versions(app, name).await?;
    let refs = references(app, name).await?;
    let plan = plan_prune(&versions, &refs, keep);
    tracing::debug!(retained = ?plan.retained, delete = ?plan.delete, "pruning versions of {}", name);

    let mut report = PruneReport::default();
    for (version, aliases) in plan.skipped {
        let reason = Error::ReferencedVersion {
            version: version.clone(),
            aliases,
        };
        tracing::warn!("not deleting: {}", reason);
        report.skipped.push(version);
    }
    for version in plan.delete {
        app.interrupt.check_interrupted()?;
        match app.service.delete_function(name, Some(&version)).await {
            Ok(()) => {
                tracing::info!("deleted version {}", version);
                report.deleted.push(version);
            }
            Err(e) => {
                tracing::warn!("failed to delete version {}: {:#}", version, e);
                report.failed.push((version, e));
            }
        }
    }
    if report.deleted.is_empty() {
        if let Some((version, e)) = report.failed.first() {
            bail!(
                "deleting old versions of {} failed for all {} candidates, first {}: {:#}",
                name,
                report.failed.len(),
                version,
                e
            );
        }
    }
    Ok(report)
}

/// Run the `versions` command.
pub(crate) async fn versions(app: &App, args: &Args, out: &mut impl Write) -> Result<()> {
    let (_, definition) = app.load_function()?;
    let name = definition.function_name.as_str();
    if args.delete {
        let keep = args.keep_versions.unwrap_or_default();
        require(keep > 0, "--keep-versions must be at least 1")?;
        let report = prune(app, name, keep).await?;
        tracing::info!(
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "pruned versions of {}",
            name
        );
        return Ok(());
    }
    let versions = list_versions(app, name).await?;
    let refs = references(app, name).await?;
    let records = version_records(&versions, &refs);
    write_records(out, &records, args.output, |r| VersionRow::from(r))
}
