use anyhow::{Context, Result};
use lambroll_core::versions::{previous_version, AliasRecord, DEFAULT_ALIAS, VERSION_LATEST};
use lambroll_core::Error;

use crate::application::App;
use crate::versions::{list_versions, references};

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Version to roll back to [default: the one before the alias's current version]
    #[arg(long)]
    version: Option<String>,

    /// Alias to repoint
    #[arg(long, default_value = DEFAULT_ALIAS)]
    alias: String,

    /// Delete the version rolled back from, unless another alias uses it
    #[arg(long)]
    delete_version: bool,

    /// Show what would be done without changing anything
    #[arg(long)]
    dry_run: bool,
}

/// Run the `rollback` command; returns the version the alias now points at.
pub(crate) async fn rollback(app: &App, args: &Args) -> Result<String> {
    let (_, definition) = app.load_function()?;
    let name = definition.function_name.as_str();
    let alias = app
        .service
        .get_alias(name, &args.alias)
        .await
        .with_context(|| format!("getting alias {} of {}", args.alias, name))?;
    let current = alias.function_version.clone();
    let versions = list_versions(app, name).await?;

    let target = match &args.version {
        Some(version) => {
            let published = version != VERSION_LATEST;
            if !published || !versions.iter().any(|v| &v.version == version) {
                return Err(Error::NotFound {
                    name: format!("version {} of {}", version, name),
                }
                .into());
            }
            version.clone()
        }
        None => previous_version(&versions, &current).ok_or_else(|| Error::NotFound {
            name: format!("a version of {} older than {}", name, current),
        })?,
    };
    tracing::info!("rolling back alias {} of {} from {} to {}", args.alias, name, current, target);
    if args.dry_run {
        return Ok(target);
    }

    app.interrupt.check_interrupted()?;
    app.service
        .update_alias(name, &AliasRecord::pointing_at(&args.alias, &target))
        .await
        .with_context(|| format!("updating alias {} of {}", args.alias, name))?;

    if args.delete_version && current != target {
        app.interrupt.check_interrupted()?;
        let refs = references(app, name).await?;
        match refs.get(&current) {
            Some(aliases) if !aliases.is_empty() => {
                let reason = Error::ReferencedVersion {
                    version: current.clone(),
                    aliases: aliases.clone(),
                };
                tracing::warn!("not deleting: {}", reason);
            }
            _ => {
                app.service
                    .delete_function(name, Some(&current))
                    .await
                    .with_context(|| format!("deleting version {} of {}", current, name))?;
                tracing::info!("deleted version {}", current);
            }
        }
    }
    Ok(target)
}
