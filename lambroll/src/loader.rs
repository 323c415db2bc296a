//! Locating and loading definition files.

use std::path::{Path, PathBuf};

use anyhow::Result;
use lambroll_core::Error;
use serde::de::DeserializeOwned;

use crate::template::{render_plain, TemplateContext};

pub(crate) const DEFAULT_FUNCTION_FILENAMES: &[&str] = &["function.json", "function.json.jinja"];
pub(crate) const DEFAULT_OPTION_FILENAMES: &[&str] = &["lambroll.json", "lambroll.json.jinja"];

const TEMPLATE_EXTENSION: &str = "jinja";

/// The first of `candidates` that exists in `dir`.
pub(crate) fn find_definition_file(dir: &Path, candidates: &[&str]) -> Result<PathBuf, Error> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| Error::NoDefinitionFile {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        })
}

fn is_template(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
}

/// Load `path`, or the first default file found in the working directory.
///
/// With a template context, `.jinja` files are rendered and every file goes
/// through the substitution pass; without one, the text is parsed as is
/// (after rendering `.jinja` files with nothing external available).
pub(crate) fn load_definition_file<T: DeserializeOwned>(
    what: &str,
    context: Option<&TemplateContext>,
    path: Option<&Path>,
    candidates: &[&str],
) -> Result<(PathBuf, T)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => find_definition_file(Path::new("."), candidates)?,
    };
    tracing::info!("loading {} from {}", what, path.display());
    let source = std::fs::read_to_string(&path).map_err(|source| Error::Load {
        path: path.clone(),
        source,
    })?;
    let parse_error = |message: String| Error::Parse {
        path: path.clone(),
        message,
    };
    let text = match context {
        Some(context) => {
            let rendered = if is_template(&path) {
                context
                    .render_template(&source)
                    .map_err(|e| parse_error(format!("{:#}", e)))?
            } else {
                source
            };
            context
                .substitute(&rendered)
                .map_err(|e| parse_error(format!("{:#}", e)))?
        }
        None if is_template(&path) => {
            render_plain(&source).map_err(|e| parse_error(format!("{:#}", e)))?
        }
        None => source,
    };
    let value = serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?;
    Ok((path, value))
}
