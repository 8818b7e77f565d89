use std::path::{Component, Path, PathBuf};

use crate::archive::ArchiveReader;
use crate::error::{Error, Result};
use crate::util;

/// Where sources land inside a workspace.
pub const SOURCE_DIR: &str = "src/main/java";

/// Recreate `workspace` and extract every entry of `archive` below
/// `<workspace>/src/main/java`. Returns the number of files written.
pub fn create_workspace(archive: &Path, workspace: &Path) -> Result<usize> {
    let mut reader = ArchiveReader::open(archive)?;
    let entries = reader.entries()?;

    // Validate every name before the old workspace is thrown away.
    let targets = entries
        .iter()
        .map(|entry| {
            safe_relative(&entry.name).ok_or_else(|| Error::UnsafeEntryName(entry.name.clone()))
        })
        .collect::<Result<Vec<PathBuf>>>()?;

    util::recreate_dir(workspace)?;
    let source_root = workspace.join(SOURCE_DIR);
    std::fs::create_dir_all(&source_root).map_err(|e| Error::io(&source_root, e))?;

    let mut files = 0;
    for (index, (entry, relative)) in entries.iter().zip(&targets).enumerate() {
        let dest = source_root.join(relative);
        if entry.is_dir {
            std::fs::create_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let data = reader.read_index(index)?;
        std::fs::write(&dest, data).map_err(|e| Error::io(&dest, e))?;
        files += 1;
    }

    tracing::info!(files, workspace = %workspace.display(), "workspace created");
    Ok(files)
}

/// Relative path for an entry name, or `None` if it could land outside the
/// extraction root.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_archive;

    #[test]
    fn test_extracts_under_source_dir() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("patched.jar");
        let ws = temp.path().join("workspace/server");
        write_archive(&jar, &[("net/A.java", b"class A {}\n"), ("B.java", b"class B {}\n")]);

        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("leftover.txt"), "old").unwrap();

        let files = create_workspace(&jar, &ws).unwrap();
        assert_eq!(files, 2);
        assert_eq!(
            std::fs::read_to_string(ws.join("src/main/java/net/A.java")).unwrap(),
            "class A {}\n"
        );
        assert!(ws.join("src/main/java/B.java").is_file());
        assert!(!ws.join("leftover.txt").exists());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("evil.jar");
        let ws = temp.path().join("ws");
        write_archive(&jar, &[("ok/A.java", b"a"), ("../../escape.txt", b"x")]);

        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("keep.txt"), "keep").unwrap();

        let err = create_workspace(&jar, &ws).unwrap_err();
        assert!(matches!(err, Error::UnsafeEntryName(ref n) if n == "../../escape.txt"));
        assert!(ws.join("keep.txt").exists());
    }

    #[test]
    fn test_safe_relative() {
        assert_eq!(safe_relative("a/b/C.java"), Some(PathBuf::from("a/b/C.java")));
        assert_eq!(safe_relative("./a"), Some(PathBuf::from("a")));
        assert_eq!(safe_relative("/etc/passwd"), None);
        assert_eq!(safe_relative("a/../../b"), None);
        assert_eq!(safe_relative(""), None);
    }
}
