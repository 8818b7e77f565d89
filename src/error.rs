use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error on {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("malformed patch at line {line}: {reason}")]
    MalformedPatch { line: usize, reason: String },

    #[error("hunk #{hunk} does not apply at line {line}: {reason}")]
    PatchDoesNotApply {
        hunk: usize,
        line: usize,
        reason: String,
    },

    /// A working-tree file has no entry of the same name in the baseline archive.
    #[error("no baseline entry for working-tree file {0}")]
    MissingBaseline(String),

    #[error("failed to apply patch for entry {entry}")]
    PatchApplicationFailed {
        entry: String,
        #[source]
        source: Box<Error>,
    },

    #[error("refusing to extract entry with unsafe name: {0}")]
    UnsafeEntryName(String),

    #[error("version {0} not present in version manifest")]
    UnknownVersion(String),

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Error::Archive {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedPatch {
            line,
            reason: reason.into(),
        }
    }
}
