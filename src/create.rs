use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveReader;
use crate::error::{Error, Result};
use crate::line_diff;
use crate::patch_format::{Patch, CONTEXT_LINES};
use crate::util::{self, TreeFile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub files_scanned: usize,
    pub patches_written: usize,
    pub unchanged: usize,
}

/// Diff every file under `tree` against the entry of the same name in
/// `baseline` and write one unified diff per changed file to
/// `<output>/<path>.patch`.
///
/// `output` is wiped first, so patches for files that were reverted disappear.
/// If anything fails after that point the partially written directory is
/// removed again.
pub fn generate_patches(baseline: &Path, tree: &Path, output: &Path) -> Result<GenerateSummary> {
    let files = util::walk_files(tree)?;
    tracing::debug!(count = files.len(), tree = %tree.display(), "collected working-tree files");

    // Stage 1: pull every baseline entry up front. The archive handle is not
    // shareable across threads, and a missing baseline should fail before the
    // output directory is touched.
    let mut archive = ArchiveReader::open(baseline)?;
    let inputs: Vec<(TreeFile, Vec<u8>)> = files
        .into_iter()
        .map(|file| {
            if !archive.contains(&file.relative_path) {
                return Err(Error::MissingBaseline(file.relative_path));
            }
            let data = archive.read(&file.relative_path)?;
            Ok((file, data))
        })
        .collect::<Result<_>>()?;
    drop(archive);

    util::recreate_dir(output)?;

    // Stage 2: diff and write in parallel. Entry names are unique, so no two
    // workers ever target the same patch file.
    let written = inputs
        .par_iter()
        .map(|(file, baseline_data)| diff_one(file, baseline_data, output))
        .collect::<Result<Vec<Option<PathBuf>>>>();

    let written = match written {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(output) {
                tracing::warn!(error = %cleanup, output = %output.display(), "failed to remove partial patch directory");
            }
            return Err(e);
        }
    };

    let patches_written = written.iter().flatten().count();
    let summary = GenerateSummary {
        files_scanned: inputs.len(),
        patches_written,
        unchanged: inputs.len() - patches_written,
    };
    tracing::info!(
        scanned = summary.files_scanned,
        written = summary.patches_written,
        "patch generation finished"
    );
    Ok(summary)
}

/// Diff a single working-tree file. Returns the patch file written, or `None`
/// when the file matches its baseline.
fn diff_one(file: &TreeFile, baseline_data: &[u8], output: &Path) -> Result<Option<PathBuf>> {
    let working = std::fs::read(&file.full_path).map_err(|e| Error::io(&file.full_path, e))?;

    let original = util::decode_lines(baseline_data, &file.relative_path);
    let revised = util::decode_lines(&working, &file.relative_path);

    let script = line_diff::compute_diff(&original, &revised);
    if script.is_unchanged() {
        return Ok(None);
    }

    let patch = Patch::from_script(
        format!("a/{}", file.relative_path),
        format!("b/{}", file.relative_path),
        &original,
        &revised,
        &script,
        CONTEXT_LINES,
    );

    let target = util::patch_file_for(output, &file.relative_path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(&target, patch.to_string()).map_err(|e| Error::io(&target, e))?;

    tracing::debug!(entry = %file.relative_path, hunks = patch.hunks.len(), "wrote patch");
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_archive;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let full = root.join(rel);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_generate_foo_patch() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("base.jar");
        let tree = temp.path().join("tree");
        let out = temp.path().join("patches");

        write_archive(
            &jar,
            &[
                ("net/Foo.java", b"class Foo {\n}\n"),
                ("net/Bar.java", b"class Bar {}\n"),
            ],
        );
        write_tree(
            &tree,
            &[
                ("net/Foo.java", "class Foo {\n  int x;\n}\n"),
                ("net/Bar.java", "class Bar {}\n"),
            ],
        );

        let summary = generate_patches(&jar, &tree, &out).unwrap();
        assert_eq!(
            summary,
            GenerateSummary {
                files_scanned: 2,
                patches_written: 1,
                unchanged: 1
            }
        );

        let text = std::fs::read_to_string(out.join("net/Foo.java.patch")).unwrap();
        assert_eq!(
            text,
            "--- a/net/Foo.java\n+++ b/net/Foo.java\n@@ -1,2 +1,3 @@\n class Foo {\n+  int x;\n }\n"
        );
        assert!(!out.join("net/Bar.java.patch").exists());
    }

    #[test]
    fn test_line_endings_are_not_content() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("base.jar");
        let tree = temp.path().join("tree");
        let out = temp.path().join("patches");

        write_archive(&jar, &[("A.java", b"a\nb\n")]);
        write_tree(&tree, &[("A.java", "a\r\nb")]);

        let summary = generate_patches(&jar, &tree, &out).unwrap();
        assert_eq!(summary.patches_written, 0);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_stale_patches_are_cleared() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("base.jar");
        let tree = temp.path().join("tree");
        let out = temp.path().join("patches");

        write_archive(&jar, &[("A.java", b"a\n")]);
        write_tree(&tree, &[("A.java", "a\n")]);
        write_tree(&out, &[("Old.java.patch", "stale")]);

        generate_patches(&jar, &tree, &out).unwrap();
        assert!(out.is_dir());
        assert!(!out.join("Old.java.patch").exists());
    }

    #[test]
    fn test_missing_baseline_fails_before_touching_output() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("base.jar");
        let tree = temp.path().join("tree");
        let out = temp.path().join("patches");

        write_archive(&jar, &[("A.java", b"a\n")]);
        write_tree(&tree, &[("A.java", "a\n"), ("New.java", "class New {}\n")]);
        write_tree(&out, &[("Keep.java.patch", "kept")]);

        let err = generate_patches(&jar, &tree, &out).unwrap_err();
        assert!(matches!(err, Error::MissingBaseline(ref p) if p == "New.java"), "{err:?}");
        assert!(out.join("Keep.java.patch").exists());
    }

    #[test]
    fn test_output_is_reproducible() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("base.jar");
        let tree = temp.path().join("tree");
        let out = temp.path().join("patches");

        let base: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let edited = base.replace("line 3\n", "line three\n").replace("line 30\n", "");
        write_archive(&jar, &[("pkg/Big.java", base.as_bytes())]);
        write_tree(&tree, &[("pkg/Big.java", edited.as_str())]);

        generate_patches(&jar, &tree, &out).unwrap();
        let first = std::fs::read(out.join("pkg/Big.java.patch")).unwrap();
        generate_patches(&jar, &tree, &out).unwrap();
        let second = std::fs::read(out.join("pkg/Big.java.patch")).unwrap();
        assert_eq!(first, second);
    }
}
