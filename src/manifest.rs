//! Launcher metadata: resolving a version in the version manifest and checking
//! downloaded jars against the SHA-1 digests in the per-version info file.
//! Fetching the files themselves happens elsewhere.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::util;

#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionRef>,
}

#[derive(Debug, Deserialize)]
pub struct VersionRef {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct VersionInfo {
    pub downloads: Downloads,
}

#[derive(Debug, Deserialize)]
pub struct Downloads {
    pub client: Artifact,
    pub server: Artifact,
}

#[derive(Debug, Deserialize)]
pub struct Artifact {
    pub sha1: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Client,
    Server,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Client => f.write_str("client"),
            ArtifactKind::Server => f.write_str("server"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    UpToDate,
    Missing,
    Mismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub url: String,
    pub state: ArtifactState,
}

impl ArtifactCheck {
    pub fn is_up_to_date(&self) -> bool {
        self.state == ArtifactState::UpToDate
    }

    /// Turn a failed check into the matching error.
    pub fn ensure(&self) -> Result<()> {
        match &self.state {
            ArtifactState::UpToDate => Ok(()),
            ArtifactState::Missing => Err(Error::NotFound(self.path.display().to_string())),
            ArtifactState::Mismatch { expected, actual } => Err(Error::ChecksumMismatch {
                path: self.path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            }),
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| Error::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// URL of the per-version info file for `version`.
pub fn resolve_version_url(manifest: &Path, version: &str) -> Result<String> {
    let manifest: VersionManifest = load_json(manifest)?;
    manifest
        .versions
        .into_iter()
        .find(|v| v.id == version)
        .map(|v| v.url)
        .ok_or_else(|| Error::UnknownVersion(version.to_string()))
}

/// Lower-case hex SHA-1 of a file.
pub fn sha1_hex(path: &Path) -> Result<String> {
    let data = util::mmap_file(path)?;
    Ok(hex::encode(Sha1::digest(&data[..])))
}

/// Check the downloaded client and server jars against `version_info`.
/// A missing jar is reported, not raised, so callers can decide to download.
pub fn verify_downloads(version_info: &Path, client: &Path, server: &Path) -> Result<Vec<ArtifactCheck>> {
    let info: VersionInfo = load_json(version_info)?;
    [
        (ArtifactKind::Client, &info.downloads.client, client),
        (ArtifactKind::Server, &info.downloads.server, server),
    ]
    .into_iter()
    .map(|(kind, artifact, path)| check_artifact(kind, artifact, path))
    .collect()
}

fn check_artifact(kind: ArtifactKind, artifact: &Artifact, path: &Path) -> Result<ArtifactCheck> {
    let state = if !path.is_file() {
        ArtifactState::Missing
    } else {
        let actual = sha1_hex(path)?;
        if actual.eq_ignore_ascii_case(&artifact.sha1) {
            ArtifactState::UpToDate
        } else {
            ArtifactState::Mismatch {
                expected: artifact.sha1.to_ascii_lowercase(),
                actual,
            }
        }
    };
    tracing::debug!(%kind, path = %path.display(), ?state, "checked download");
    Ok(ArtifactCheck {
        kind,
        path: path.to_path_buf(),
        url: artifact.url.clone(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_info(dir: &Path, client_sha1: &str, server_sha1: &str) -> PathBuf {
        let path = dir.join("version_info.json");
        let json = serde_json::json!({
            "id": "1.16.4",
            "downloads": {
                "client": { "sha1": client_sha1, "size": 12, "url": "https://example.invalid/client.jar" },
                "server": { "sha1": server_sha1, "size": 12, "url": "https://example.invalid/server.jar" }
            }
        });
        std::fs::write(&path, json.to_string()).unwrap();
        path
    }

    #[test]
    fn test_resolve_version_url() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = temp.path().join("version_manifest.json");
        std::fs::write(
            &manifest,
            r#"{"latest":{},"versions":[
                {"id":"1.16.3","type":"release","url":"https://example.invalid/1.16.3.json"},
                {"id":"1.16.4","type":"release","url":"https://example.invalid/1.16.4.json"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            resolve_version_url(&manifest, "1.16.4").unwrap(),
            "https://example.invalid/1.16.4.json"
        );
        let err = resolve_version_url(&manifest, "9.9").unwrap_err();
        assert!(matches!(err, Error::UnknownVersion(v) if v == "9.9"));
    }

    #[test]
    fn test_bad_json_is_manifest_error() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = temp.path().join("broken.json");
        std::fs::write(&manifest, "{ not json").unwrap();
        assert!(matches!(
            resolve_version_url(&manifest, "1").unwrap_err(),
            Error::Manifest { .. }
        ));
    }

    #[test]
    fn test_verify_downloads_states() {
        let temp = tempfile::tempdir().unwrap();
        let client = temp.path().join("client.jar");
        let server = temp.path().join("server.jar");
        std::fs::write(&client, "client-bytes").unwrap();

        let client_sha1 = sha1_hex(&client).unwrap();
        let info = version_info(temp.path(), &client_sha1.to_uppercase(), "00");

        let checks = verify_downloads(&info, &client, &server).unwrap();
        assert!(checks[0].is_up_to_date());
        assert_eq!(checks[1].state, ArtifactState::Missing);
        assert!(matches!(checks[1].ensure(), Err(Error::NotFound(_))));

        std::fs::write(&server, "server-bytes").unwrap();
        let checks = verify_downloads(&info, &client, &server).unwrap();
        assert!(matches!(checks[1].state, ArtifactState::Mismatch { .. }));
        assert!(matches!(checks[1].ensure(), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_version_info_reads_only_sha1_and_url() {
        let info: VersionInfo = serde_json::from_str(
            r#"{"downloads":{
                "client":{"sha1":"aa","size":3,"url":"https://example.invalid/c.jar"},
                "server":{"sha1":"bb","url":"https://example.invalid/s.jar"}
            }}"#,
        )
        .unwrap();
        assert_eq!(info.downloads.client.sha1, "aa");
        assert_eq!(info.downloads.server.url, "https://example.invalid/s.jar");
    }

    #[test]
    fn test_sha1_hex_known_value() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(sha1_hex(&path).unwrap(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
