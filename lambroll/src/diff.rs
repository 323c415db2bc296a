use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lambroll_core::definition::BackingType;
use lambroll_core::diff::{code_digest_diff, diff as diff_definitions, IgnoreQuery};
use lambroll_core::normalize::normalize;
use lambroll_core::plan::ensure_compatible_code;
use lambroll_core::Error;

use crate::application::App;
use crate::archive::load_zip_archive;
use crate::output::write_diff;

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Zip archive compared by `--code-sha256`
    #[arg(long, default_value = "function.zip")]
    src: PathBuf,

    /// Also compare the digest of the archive with the deployed code
    #[arg(long)]
    code_sha256: bool,

    /// JSONPath expression whose matches are left out of the comparison,
    /// e.g. `$.Environment.Variables.VERSION`
    #[arg(long = "ignore", value_name = "EXPR")]
    ignore: Vec<String>,
}

/// Run the `diff` command; returns whether anything differs.
pub(crate) async fn diff(app: &App, args: &Args, out: &mut impl Write) -> Result<bool> {
    let ignore = IgnoreQuery::parse_all(&args.ignore)?;
    let (path, desired) = app.load_function()?;
    let name = desired.function_name.as_str();
    let current = app
        .service
        .get_function(name)
        .await
        .with_context(|| format!("getting function {}", name))?;

    let from = current.arn().unwrap_or(name).to_string();
    let to = path.display().to_string();
    let mirrored = normalize(current.to_definition());
    let mut result = diff_definitions(&mirrored, &desired, &ignore, &from, &to)?;

    if args.code_sha256 {
        if current.backing_type() == BackingType::Image {
            return Err(Error::Usage(format!(
                "{} runs a container image; --code-sha256 only applies to zip archives",
                name
            ))
            .into());
        }
        let archive = load_zip_archive(&args.src)?;
        let code = code_digest_diff(
            current.code_sha256().unwrap_or_default(),
            &archive.sha256,
            &from,
            &to,
        );
        result.changes.extend(code.changes);
    }

    write_diff(out, &result, app.color)?;
    ensure_compatible_code(current.backing_type(), desired.backing_type())?;
    Ok(!result.is_empty())
}
