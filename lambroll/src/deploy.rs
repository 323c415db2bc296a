use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::ArgAction;
use lambroll_core::definition::CodeReference;
use lambroll_core::error::is_not_found;
use lambroll_core::normalize::NormalizedDefinition;
use lambroll_core::plan::{
    ensure_compatible_code, plan_deploy, CodeChange, DeployPlan, UpdatePlan,
};
use lambroll_core::remote::RemoteFunction;
use lambroll_core::versions::{AliasRecord, DEFAULT_ALIAS};
use lambroll_core::Error;
use lambroll_remote::{CodePayload, CodeUpdateRequest, CreateFunctionRequest};
use tracing::Instrument as _;

use crate::application::App;
use crate::archive::{load_zip_archive, Archive};
use crate::versions::prune;

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Zip archive holding the function code
    #[arg(long, default_value = "function.zip")]
    src: PathBuf,

    /// Leave the deployed code as it is and only update the configuration
    #[arg(long)]
    skip_archive: bool,

    /// Publish a version and point the alias at it
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    publish: bool,

    /// Alias to point at the published version
    #[arg(long, default_value = DEFAULT_ALIAS)]
    alias: String,

    /// Share of the alias's traffic that stays on the version it pointed at
    /// before, for a gradual rollout
    #[arg(long, value_parser = parse_weight)]
    previous_version_weight: Option<f64>,

    /// After deploying, delete all but this many of the newest versions
    #[arg(long, default_value_t = 0)]
    keep_versions: usize,

    /// Show what would be done without changing anything
    #[arg(long)]
    dry_run: bool,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            src: PathBuf::from("function.zip"),
            skip_archive: false,
            publish: true,
            alias: DEFAULT_ALIAS.to_string(),
            previous_version_weight: None,
            keep_versions: 0,
            dry_run: false,
        }
    }
}

fn parse_weight(s: &str) -> Result<f64, String> {
    let weight: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..1.0).contains(&weight) {
        Ok(weight)
    } else {
        Err(format!("weight must be at least 0 and less than 1, got {}", weight))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// `version` is absent for dry runs and when nothing was published.
    Created { version: Option<String> },
    Updated { version: Option<String> },
    Unchanged,
}

/// Run the `deploy` command.
pub(crate) async fn deploy(app: &App, args: &Args) -> Result<Outcome> {
    let (path, desired) = app.load_function()?;
    let span = tracing::info_span!("deploy", function = %desired.function_name);
    async move {
        tracing::info!("deploying {} from {}", desired.function_name, path.display());
        let outcome = reconcile(app, args, desired).await?;
        tracing::debug!(?outcome, "deploy finished");
        Ok(outcome)
    }
    .instrument(span)
    .await
}

async fn reconcile(app: &App, args: &Args, desired: NormalizedDefinition) -> Result<Outcome> {
    let name = desired.function_name.clone();
    let current = match app.service.get_function(&name).await {
        Ok(function) => Some(function),
        Err(e) if is_not_found(&e) => None,
        Err(e) => return Err(e.context(format!("getting function {}", name))),
    };
    if let Some(current) = &current {
        ensure_compatible_code(current.backing_type(), desired.backing_type())?;
    }
    app.interrupt.check_interrupted()?;

    let archive = match desired.code {
        CodeReference::Archive if !args.skip_archive => Some(load_zip_archive(&args.src)?),
        _ => None,
    };
    let digest = archive.as_ref().map(|a| a.sha256.as_str());
    let outcome = match plan_deploy(current.as_ref(), &desired, digest)? {
        DeployPlan::Unchanged => {
            tracing::info!("{} is up to date", name);
            return Ok(Outcome::Unchanged);
        }
        DeployPlan::Create(definition) => create(app, args, definition, archive).await?,
        DeployPlan::Update(plan) => {
            let current = current.ok_or_else(|| anyhow!("no deployed function to update"))?;
            update(app, args, &current, plan, archive).await?
        }
    };

    if args.keep_versions > 0 && args.publish && !args.dry_run {
        app.interrupt.check_interrupted()?;
        prune(app, &name, args.keep_versions).await?;
    }
    Ok(outcome)
}

async fn create(
    app: &App,
    args: &Args,
    definition: NormalizedDefinition,
    archive: Option<Archive>,
) -> Result<Outcome> {
    let name = definition.function_name.clone();
    let code = match (&definition.code, archive) {
        (CodeReference::Image { uri }, _) => CodePayload::Image(uri.clone()),
        (CodeReference::Archive, Some(archive)) => CodePayload::Archive(archive.bytes),
        (CodeReference::Archive, None) => {
            return Err(Error::Usage(format!(
                "function {} does not exist yet; it cannot be created with --skip-archive",
                name
            ))
            .into())
        }
    };
    if args.dry_run {
        tracing::info!("would create function {}", name);
        return Ok(Outcome::Created { version: None });
    }

    let request = CreateFunctionRequest {
        definition,
        code,
        publish: args.publish,
    };
    let version = app
        .service
        .create_function(&request)
        .await
        .with_context(|| format!("creating function {}", name))?;
    tracing::info!(version = %version, "created function {}", name);
    if !args.publish {
        return Ok(Outcome::Created { version: None });
    }

    app.interrupt.check_interrupted()?;
    let alias = AliasRecord::pointing_at(&args.alias, &version);
    app.service
        .create_alias(&name, &alias)
        .await
        .with_context(|| format!("creating alias {} of {}", args.alias, name))?;
    tracing::info!("alias {} now points at version {}", args.alias, version);
    Ok(Outcome::Created {
        version: Some(version),
    })
}

fn log_plan(name: &str, plan: &UpdatePlan) {
    if !plan.configuration.is_empty() {
        tracing::info!(
            fields = ?plan.configuration.changed_fields(),
            "configuration of {} changes",
            name
        );
    }
    if !plan.tags.is_empty() {
        tracing::info!(
            set = ?plan.tags.set.keys().collect::<Vec<_>>(),
            remove = ?plan.tags.remove,
            "tags of {} change",
            name
        );
    }
    match &plan.code {
        Some(CodeChange::Archive { sha256 }) => {
            tracing::info!("code of {} changes to {}", name, sha256)
        }
        Some(CodeChange::Image { uri }) => tracing::info!("image of {} changes to {}", name, uri),
        None => {}
    }
}

async fn update(
    app: &App,
    args: &Args,
    current: &RemoteFunction,
    plan: UpdatePlan,
    archive: Option<Archive>,
) -> Result<Outcome> {
    let name = current.name();
    log_plan(name, &plan);
    if args.dry_run {
        return Ok(Outcome::Updated { version: None });
    }

    if !plan.configuration.is_empty() {
        app.service
            .update_function_configuration(name, &plan.configuration)
            .await
            .with_context(|| format!("updating configuration of {}", name))?;
    }

    if !plan.tags.is_empty() {
        app.interrupt.check_interrupted()?;
        let arn = current
            .arn()
            .ok_or_else(|| anyhow!("function {} has no ARN to tag", name))?;
        if !plan.tags.set.is_empty() {
            app.service
                .tag_function(arn, &plan.tags.set)
                .await
                .with_context(|| format!("tagging {}", name))?;
        }
        if !plan.tags.remove.is_empty() {
            app.service
                .untag_function(arn, &plan.tags.remove)
                .await
                .with_context(|| format!("untagging {}", name))?;
        }
    }

    if let Some(change) = plan.code {
        app.interrupt.check_interrupted()?;
        let code = match (change, archive) {
            (CodeChange::Image { uri }, _) => CodePayload::Image(uri),
            (CodeChange::Archive { .. }, Some(archive)) => CodePayload::Archive(archive.bytes),
            (CodeChange::Archive { .. }, None) => {
                return Err(anyhow!("code of {} changed but no archive was loaded", name))
            }
        };
        let request = CodeUpdateRequest {
            code,
            architectures: plan.architectures,
        };
        app.service
            .update_function_code(name, &request)
            .await
            .with_context(|| format!("updating code of {}", name))?;
    }

    if !args.publish {
        return Ok(Outcome::Updated { version: None });
    }
    app.interrupt.check_interrupted()?;
    let version = app
        .service
        .publish_version(name)
        .await
        .with_context(|| format!("publishing a version of {}", name))?;
    tracing::info!("published version {} of {}", version, name);
    point_alias(app, name, &args.alias, &version, args.previous_version_weight).await?;
    Ok(Outcome::Updated {
        version: Some(version),
    })
}

/// Point `alias` at `version`, creating it if needed. With a weight, the
/// version the alias pointed at before keeps that share of the traffic.
pub(crate) async fn point_alias(
    app: &App,
    name: &str,
    alias: &str,
    version: &str,
    previous_weight: Option<f64>,
) -> Result<()> {
    let existing = match app.service.get_alias(name, alias).await {
        Ok(existing) => Some(existing),
        Err(e) if is_not_found(&e) => None,
        Err(e) => return Err(e.context(format!("getting alias {} of {}", alias, name))),
    };
    let mut record = AliasRecord::pointing_at(alias, version);
    let Some(existing) = existing else {
        app.service
            .create_alias(name, &record)
            .await
            .with_context(|| format!("creating alias {} of {}", alias, name))?;
        tracing::info!("created alias {} pointing at version {}", alias, version);
        return Ok(());
    };
    if let Some(weight) = previous_weight {
        if existing.function_version != version {
            record
                .additional_version_weights
                .insert(existing.function_version.clone(), weight);
        }
    }
    app.service
        .update_alias(name, &record)
        .await
        .with_context(|| format!("updating alias {} of {}", alias, name))?;
    tracing::info!(
        previous = %existing.function_version,
        "alias {} now points at version {}",
        alias,
        version
    );
    Ok(())
}
