use memmap2::Mmap;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Suffix appended to an entry name to locate its patch file.
pub const PATCH_SUFFIX: &str = ".patch";

#[derive(Debug, Clone)]
pub struct TreeFile {
    /// Path relative to the walked root, always forward-slash separated.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Walk a directory tree and collect every regular file with its relative path.
/// Paths use forward slashes so they line up with archive entry names.
/// The result is sorted by relative path.
pub fn walk_files(root: &Path) -> Result<Vec<TreeFile>> {
    let root = root.canonicalize().map_err(|e| Error::io(root, e))?;

    let mut files = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            Error::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative_path = full_path
            .strip_prefix(&root)
            .ok()
            .and_then(entry_name)
            .ok_or_else(|| {
                Error::io(
                    &full_path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "path is not valid UTF-8 relative to the tree root",
                    ),
                )
            })?;

        let size = entry
            .metadata()
            .map_err(|e| Error::io(&full_path, e.into()))?
            .len();

        files.push(TreeFile {
            relative_path,
            full_path,
            size,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Archive entry name for a path relative to a source root.
pub fn entry_name(relative: &Path) -> Option<String> {
    Some(relative.to_str()?.replace('\\', "/"))
}

/// Location of the patch file for `entry` under `patch_root`.
pub fn patch_file_for(patch_root: &Path, entry: &str) -> PathBuf {
    patch_root.join(format!("{entry}{PATCH_SUFFIX}"))
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    // SAFETY: We only read from this mapping; inputs are not modified during a run.
    unsafe { Mmap::map(&file).map_err(|e| Error::io(path, e)) }
}

/// Decode bytes as text and split them into lines without terminators.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn decode_lines(bytes: &[u8], origin: &str) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    if let Cow::Owned(_) = text {
        tracing::warn!(origin, "invalid UTF-8 replaced while decoding lines");
    }
    text.lines().map(str::to_owned).collect()
}

/// Join lines, terminating every line with `\n`.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let capacity = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// Delete `dir` if present and recreate it empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(dir, e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Stream a file into a BLAKE3 hasher.
/// Uses a 256 KB BufReader to reduce syscall overhead vs the default 8 KB.
pub fn hash_file_into(hasher: &mut blake3::Hasher, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = std::io::BufReader::with_capacity(256 * 1024, file);
    std::io::copy(&mut reader, hasher).map_err(|e| Error::io(path, e))?;
    Ok(())
}
