use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as _;
use lambroll_core::Error;
use sha2::{Digest, Sha256};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// A zip archive ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Archive {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// base64 of the SHA-256 of `bytes`, as the service reports `CodeSha256`.
    pub sha256: String,
}

pub(crate) fn code_sha256(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

pub(crate) fn load_zip_archive(path: &Path) -> Result<Archive> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(Error::Usage(format!(
            "{} is not a zip archive; build it before deploying",
            path.display()
        ))
        .into());
    }
    tracing::debug!(path = %path.display(), size = bytes.len(), "loaded archive");
    Ok(Archive {
        path: path.to_path_buf(),
        sha256: code_sha256(&bytes),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_service_encoding() {
        // sha256("") in base64
        assert_eq!(
            code_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn loads_zip_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("function.zip");
        let mut content = ZIP_MAGIC.to_vec();
        content.extend_from_slice(b"rest");
        std::fs::write(&zip, &content).unwrap();
        let archive = load_zip_archive(&zip).unwrap();
        assert_eq!(archive.bytes, content);
        assert_eq!(archive.sha256, code_sha256(&content));

        let text = dir.path().join("function.txt");
        std::fs::write(&text, "hello").unwrap();
        let err = load_zip_archive(&text).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Usage(_))));

        assert!(load_zip_archive(&dir.path().join("missing.zip")).is_err());
    }
}
