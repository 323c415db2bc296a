use std::path::PathBuf;

use crate::definition::BackingType;

/// Failures that callers classify and react to.
///
/// These travel inside [`anyhow::Error`]; use [`is_not_found`] and
/// [`is_transient`] rather than string matching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no function definition file found, tried: {}", .candidates.join(", "))]
    NoDefinitionFile { candidates: Vec<String> },

    #[error("could not read {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{name} not found")]
    NotFound { name: String },

    #[error("cannot switch function code from {current} to {desired}; delete and recreate the function instead")]
    CodeTypeMismatch {
        current: BackingType,
        desired: BackingType,
    },

    #[error("{operation} failed with a retryable error: {message}")]
    Transient { operation: String, message: String },

    #[error("{operation} failed: {message}")]
    Remote { operation: String, message: String },

    #[error("version {version} is referenced by alias {}", .aliases.join(", "))]
    ReferencedVersion {
        version: String,
        aliases: Vec<String>,
    },

    #[error("invalid ignore expression {expression:?}: {message}")]
    IgnoreExpression { expression: String, message: String },

    #[error("{0}")]
    Usage(String),

    #[error("interrupted")]
    Interrupted,
}

fn classify(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|cause| cause.downcast_ref::<Error>())
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(classify(err), Some(Error::NotFound { .. }))
}

pub fn is_transient(err: &anyhow::Error) -> bool {
    matches!(classify(err), Some(Error::Transient { .. }))
}

pub fn is_interrupted(err: &anyhow::Error) -> bool {
    matches!(classify(err), Some(Error::Interrupted))
}
