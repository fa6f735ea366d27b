//! Manifest assembly and `code.json` artifact emission.
//!
//! Serializes the assembled manifest into a downloadable artifact and, when
//! asked, writes it to disk atomically.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use codejson_shared::{CodeJsonError, ManifestDocument, ReleaseEntry, Result};

/// File name of the exported artifact.
pub const ARTIFACT_FILENAME: &str = "code.json";

/// Content type of the exported artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/json";

/// A file-like export ready to hand to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub content_type: String,
    /// Compact UTF-8 JSON.
    pub body: String,
    /// Hex SHA-256 of `body`.
    pub sha256: String,
}

impl Artifact {
    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }
}

/// Wrap the releases, in the order given, into a manifest.
pub fn assemble_manifest(releases: Vec<ReleaseEntry>) -> ManifestDocument {
    debug!(releases = releases.len(), "assembling manifest");
    ManifestDocument::new(releases)
}

/// Serialize a manifest into the `code.json` artifact.
pub fn build_artifact(manifest: &ManifestDocument) -> Result<Artifact> {
    let body = serde_json::to_string(manifest).map_err(|e| {
        CodeJsonError::validation(format!("JSON serialization failed: {e}"))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    Ok(Artifact {
        filename: ARTIFACT_FILENAME.to_string(),
        content_type: ARTIFACT_CONTENT_TYPE.to_string(),
        body,
        sha256,
    })
}

/// Write the artifact into `dir`, replacing any previous export.
///
/// The body is written to a hidden temp file first and renamed into place,
/// so a reader never sees a half-written `code.json`.
#[instrument(skip_all, fields(dir = %dir.display(), file = %artifact.filename))]
pub fn write_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CodeJsonError::io(dir, e))?;

    let target = dir.join(&artifact.filename);
    let temp = dir.join(format!(".{}.tmp", artifact.filename));

    std::fs::write(&temp, &artifact.body).map_err(|e| CodeJsonError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| CodeJsonError::io(&target, e))?;

    info!(
        path = %target.display(),
        size = artifact.size_bytes(),
        sha256 = %artifact.sha256,
        "artifact written"
    );

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cj-assembler-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_manifest_artifact() {
        let artifact = build_artifact(&assemble_manifest(vec![])).unwrap();

        assert_eq!(artifact.filename, "code.json");
        assert_eq!(artifact.content_type, "application/json");
        assert_eq!(
            artifact.body,
            r#"{"agency":"VA","version":"2.0.0","measurementType":{"method":"modules"},"releases":[]}"#
        );
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[test]
    fn same_manifest_same_checksum() {
        let a = build_artifact(&assemble_manifest(vec![])).unwrap();
        let b = build_artifact(&assemble_manifest(vec![])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn write_artifact_replaces_previous_file() {
        let tmp = temp_dir();
        let out = tmp.join("out");

        let artifact = build_artifact(&assemble_manifest(vec![])).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("code.json"), "stale").unwrap();

        let path = write_artifact(&out, &artifact).unwrap();

        assert_eq!(path, out.join("code.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), artifact.body);

        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files should be renamed away");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
