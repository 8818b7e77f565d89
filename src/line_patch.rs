use crate::error::{Error, Result};
use crate::patch_format::{HunkLine, Patch};

/// Reconstruct the revised lines from `original` and a patch.
///
/// Every hunk must match exactly at its recorded offset: the context and removed
/// lines are compared against `original` before anything is substituted. There is
/// no fuzz and no offset search, so a stale patch fails instead of landing
/// somewhere else.
pub fn apply_patch<S: AsRef<str>>(original: &[S], patch: &Patch) -> Result<Vec<String>> {
    let estimated = patch
        .hunks
        .iter()
        .fold(original.len(), |n, h| (n + h.new_len).saturating_sub(h.old_len));
    let mut result: Vec<String> = Vec::with_capacity(estimated);
    let mut cursor = 0;

    for (i, hunk) in patch.hunks.iter().enumerate() {
        let number = i + 1;
        if hunk.old_start < cursor {
            return Err(Error::PatchDoesNotApply {
                hunk: number,
                line: hunk.old_start + 1,
                reason: "overlaps the previous hunk".to_string(),
            });
        }
        if hunk.old_start > original.len() {
            return Err(Error::PatchDoesNotApply {
                hunk: number,
                line: hunk.old_start + 1,
                reason: format!("starts past the end of the file ({} lines)", original.len()),
            });
        }

        let mut pos = hunk.old_start;
        for expected in hunk.old_lines() {
            let Some(actual) = original.get(pos) else {
                return Err(Error::PatchDoesNotApply {
                    hunk: number,
                    line: pos + 1,
                    reason: format!("expected {expected:?}, found end of file"),
                });
            };
            if actual.as_ref() != expected {
                return Err(Error::PatchDoesNotApply {
                    hunk: number,
                    line: pos + 1,
                    reason: format!("expected {expected:?}, found {:?}", actual.as_ref()),
                });
            }
            pos += 1;
        }

        result.extend(original[cursor..hunk.old_start].iter().map(|s| s.as_ref().to_string()));
        result.extend(hunk.lines.iter().filter_map(|line| match line {
            HunkLine::Context(s) | HunkLine::Add(s) => Some(s.clone()),
            HunkLine::Remove(_) => None,
        }));
        cursor = pos;
    }

    result.extend(original[cursor..].iter().map(|s| s.as_ref().to_string()));
    Ok(result)
}
