use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::archive::{self, ArchiveReader, ArchiveWriter};
use crate::error::{Error, Result};
use crate::line_patch;
use crate::patch_format::Patch;
use crate::util::{self, PATCH_SUFFIX};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub entries: usize,
    pub patched: usize,
    pub copied: usize,
}

struct PatchJob {
    index: usize,
    name: String,
    original: Vec<u8>,
    patch_path: PathBuf,
}

/// Write a copy of `baseline` to `output` with every entry that has a
/// `<patches>/<entry>.patch` file replaced by its patched text.
///
/// Entry names and order are preserved; untouched entries are copied without
/// recompression. With no patch directory the archive is copied byte for byte.
/// Nothing is written to `output` unless every patch applies.
pub fn apply_patches(baseline: &Path, patches: Option<&Path>, output: &Path) -> Result<ApplySummary> {
    let Some(patch_root) = patches else {
        archive::copy_archive(baseline, output)?;
        let entries = ArchiveReader::open(output)?.len();
        tracing::info!(entries, "no patch directory, copied baseline archive");
        return Ok(ApplySummary {
            entries,
            patched: 0,
            copied: entries,
        });
    };
    if !patch_root.is_dir() {
        return Err(Error::NotFound(patch_root.display().to_string()));
    }

    let mut reader = ArchiveReader::open(baseline)?;
    let entries = reader.entries()?;

    warn_orphan_patches(&reader, patch_root)?;

    // Stage 1: collect the entries that have a patch, reading their baseline
    // payload on the single archive handle.
    let mut jobs = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if entry.is_dir {
            continue;
        }
        let patch_path = util::patch_file_for(patch_root, &entry.name);
        if !patch_path.is_file() {
            continue;
        }
        jobs.push(PatchJob {
            index,
            name: entry.name.clone(),
            original: reader.read_index(index)?,
            patch_path,
        });
    }

    // Stage 2: parse and apply in parallel.
    let mut patched: HashMap<usize, Vec<u8>> = jobs
        .par_iter()
        .map(|job| {
            patch_entry(job)
                .map(|data| (job.index, data))
                .map_err(|e| Error::PatchApplicationFailed {
                    entry: job.name.clone(),
                    source: Box::new(e),
                })
        })
        .collect::<Result<_>>()?;
    let patched_count = patched.len();

    // Stage 3: a single writer emits entries in their original order.
    let mut writer = ArchiveWriter::create(output)?;
    for (index, entry) in entries.iter().enumerate() {
        match patched.remove(&index) {
            Some(data) => writer.write_entry(&entry.name, &data)?,
            None => writer.copy_entry(&mut reader, index)?,
        }
    }
    writer.finish()?;

    let summary = ApplySummary {
        entries: entries.len(),
        patched: patched_count,
        copied: entries.len() - patched_count,
    };
    tracing::info!(
        entries = summary.entries,
        patched = summary.patched,
        output = %output.display(),
        "patches applied"
    );
    Ok(summary)
}

fn patch_entry(job: &PatchJob) -> Result<Vec<u8>> {
    let text = std::fs::read_to_string(&job.patch_path).map_err(|e| Error::io(&job.patch_path, e))?;
    let patch = Patch::parse(&text)?;
    let original = util::decode_lines(&job.original, &job.name);
    let revised = line_patch::apply_patch(&original, &patch)?;
    tracing::debug!(entry = %job.name, hunks = patch.hunks.len(), "patched entry");
    Ok(util::join_lines(&revised).into_bytes())
}

/// Patch files with no matching entry would be skipped without a trace; say so.
fn warn_orphan_patches(reader: &ArchiveReader, patch_root: &Path) -> Result<()> {
    for file in util::walk_files(patch_root)? {
        let Some(entry) = file.relative_path.strip_suffix(PATCH_SUFFIX) else {
            tracing::warn!(file = %file.relative_path, "ignoring non-patch file in patch directory");
            continue;
        };
        if !reader.contains(entry) {
            tracing::warn!(entry, archive = %reader.path().display(), "patch has no matching archive entry");
        }
    }
    Ok(())
}
