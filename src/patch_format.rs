//! Unified diff patches: building them from an edit script, rendering them as
//! text and parsing that text back.
//!
//! Hunk offsets are stored 0-based. In the rendered `@@ -l,s +l,s @@` header a
//! side with length 0 shows the line *before* the change (0 at the top of the
//! file), everything else is 1-based.

use std::fmt;

use crate::error::{Error, Result};
use crate::line_diff::{EditOp, EditScript};

/// Lines of unchanged context kept around each change.
pub const CONTEXT_LINES: usize = 3;

const OLD_HEADER: &str = "--- ";
const NEW_HEADER: &str = "+++ ";
const HUNK_HEADER: &str = "@@ ";
const NO_NEWLINE_MARKER: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            render_range(self.old_start, self.old_len),
            render_range(self.new_start, self.new_len)
        )
    }

    /// Lines this hunk expects to find in the original, in order.
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
            HunkLine::Add(_) => None,
        })
    }

    /// Lines this hunk produces in the revised text, in order.
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
            HunkLine::Remove(_) => None,
        })
    }
}

/// A patch between exactly one pair of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

impl Patch {
    /// Build the hunks for `script`, keeping `context` lines of unchanged text
    /// around each change. Changes whose context would touch or overlap share a
    /// hunk.
    pub fn from_script<S: AsRef<str>>(
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        original: &[S],
        revised: &[S],
        script: &EditScript,
        context: usize,
    ) -> Self {
        let changes: Vec<&EditOp> = script.changes().collect();
        let mut hunks = Vec::new();

        let mut first = 0;
        while first < changes.len() {
            let mut last = first;
            while last + 1 < changes.len()
                && changes[last + 1].old_range().start - changes[last].old_range().end
                    <= 2 * context
            {
                last += 1;
            }
            hunks.push(build_hunk(original, revised, &changes[first..=last], context));
            first = last + 1;
        }

        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
            hunks,
        }
    }

    /// Parse unified diff text for a single file.
    pub fn parse(text: &str) -> Result<Self> {
        Parser::new(text).parse()
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{OLD_HEADER}{}", self.old_path)?;
        writeln!(f, "{NEW_HEADER}{}", self.new_path)?;
        for hunk in &self.hunks {
            writeln!(f, "{}", hunk.header())?;
            for line in &hunk.lines {
                match line {
                    HunkLine::Context(s) => writeln!(f, " {s}")?,
                    HunkLine::Remove(s) => writeln!(f, "-{s}")?,
                    HunkLine::Add(s) => writeln!(f, "+{s}")?,
                }
            }
        }
        Ok(())
    }
}

fn build_hunk<S: AsRef<str>>(
    original: &[S],
    revised: &[S],
    changes: &[&EditOp],
    context: usize,
) -> Hunk {
    let head = changes[0];
    let tail = changes[changes.len() - 1];

    let old_start = head.old_range().start.saturating_sub(context);
    let new_start = head.new_range().start - (head.old_range().start - old_start);
    let old_end = (tail.old_range().end + context).min(original.len());
    let new_end = tail.new_range().end + (old_end - tail.old_range().end);

    let owned = |s: &S| s.as_ref().to_string();
    let mut lines = Vec::with_capacity(new_end - new_start + tail.old_range().len());
    let mut cursor = old_start;

    for change in changes {
        let old = change.old_range();
        lines.extend(original[cursor..old.start].iter().map(|s| HunkLine::Context(owned(s))));
        lines.extend(original[old.clone()].iter().map(|s| HunkLine::Remove(owned(s))));
        lines.extend(revised[change.new_range()].iter().map(|s| HunkLine::Add(owned(s))));
        cursor = old.end;
    }
    lines.extend(original[cursor..old_end].iter().map(|s| HunkLine::Context(owned(s))));

    Hunk {
        old_start,
        old_len: old_end - old_start,
        new_start,
        new_len: new_end - new_start,
        lines,
    }
}

fn render_range(start: usize, len: usize) -> String {
    let shown = if len == 0 { start } else { start + 1 };
    format!("{shown},{len}")
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    /// Set when the file header ends in `\r`: the whole patch went through a
    /// CRLF conversion and one `\r` is dropped from every following line.
    crlf: bool,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        // Split on `\n` only. A `\r` that belongs to a line's content has to
        // survive, since rendering writes it back verbatim.
        Self {
            lines: text.split_terminator('\n').collect(),
            pos: 0,
            crlf: false,
        }
    }

    /// 1-based number of the line at `pos`.
    fn line_no(&self) -> usize {
        self.pos + 1
    }

    fn peek(&self) -> Option<&'a str> {
        self.line(self.pos)
    }

    fn line(&self, index: usize) -> Option<&'a str> {
        let line = *self.lines.get(index)?;
        if self.crlf {
            Some(line.strip_suffix('\r').unwrap_or(line))
        } else {
            Some(line)
        }
    }

    fn is_blank(line: &str) -> bool {
        line.trim_end_matches('\r').is_empty()
    }

    fn parse(mut self) -> Result<Patch> {
        // Anything before the file header (e.g. `diff --git` lines) is ignored.
        loop {
            match self.peek() {
                Some(line) if line.starts_with(OLD_HEADER) => break,
                Some(line) if line.starts_with(HUNK_HEADER) => {
                    return Err(Error::malformed(self.line_no(), "hunk before file header"));
                }
                Some(_) => self.pos += 1,
                None => return Err(Error::malformed(self.line_no(), "missing `---` file header")),
            }
        }

        let old_header = self.lines[self.pos];
        self.crlf = old_header.ends_with('\r');
        let old_path = header_path(&old_header[OLD_HEADER.len()..]);
        self.pos += 1;
        let new_path = match self.peek() {
            Some(line) if line.starts_with(NEW_HEADER) => header_path(&line[NEW_HEADER.len()..]),
            _ => {
                return Err(Error::malformed(
                    self.line_no(),
                    "expected `+++` header after `---` header",
                ))
            }
        };
        self.pos += 1;

        let mut hunks: Vec<Hunk> = Vec::new();
        let mut shift: isize = 0;
        while let Some(line) = self.peek() {
            if line.starts_with(NO_NEWLINE_MARKER) {
                self.pos += 1;
                continue;
            }
            if Self::is_blank(line) && self.lines[self.pos..].iter().all(|l| Self::is_blank(l)) {
                break;
            }
            if !line.starts_with(HUNK_HEADER) {
                return Err(Error::malformed(
                    self.line_no(),
                    format!("expected hunk header, found {line:?}"),
                ));
            }

            let header_line = self.line_no();
            let hunk = self.parse_hunk()?;
            if let Some(prev) = hunks.last() {
                if hunk.old_start < prev.old_start + prev.old_len {
                    return Err(Error::malformed(
                        header_line,
                        "hunks overlap or are out of order",
                    ));
                }
            }
            // Outside the hunks both sides are identical, so each revised start
            // is the original start shifted by the growth of the hunks before it.
            let expected_new_start = hunk.old_start as isize + shift;
            if hunk.new_start as isize != expected_new_start {
                return Err(Error::malformed(
                    header_line,
                    format!(
                        "hunk offsets are inconsistent: revised side starts at {}, expected {}",
                        render_range(hunk.new_start, hunk.new_len),
                        render_range(expected_new_start.max(0) as usize, hunk.new_len)
                    ),
                ));
            }
            shift += hunk.new_len as isize - hunk.old_len as isize;
            hunks.push(hunk);
        }

        Ok(Patch {
            old_path,
            new_path,
            hunks,
        })
    }

    fn parse_hunk(&mut self) -> Result<Hunk> {
        let header_line = self.line_no();
        let header = self.lines[self.pos].trim_end_matches('\r');
        let (old_start, old_len, new_start, new_len) = parse_hunk_header(header)
            .ok_or_else(|| Error::malformed(header_line, format!("unparsable hunk header {header:?}")))?;
        self.pos += 1;

        let mut old_left = old_len;
        let mut new_left = new_len;
        let mut lines = Vec::with_capacity(old_len.max(new_len));

        while old_left > 0 || new_left > 0 {
            let Some(line) = self.peek() else {
                return Err(self.short_hunk(header_line, old_left, new_left));
            };
            if line.starts_with(HUNK_HEADER) {
                return Err(self.short_hunk(header_line, old_left, new_left));
            }

            let (kind, body) = match line.chars().next() {
                None => (' ', ""),
                Some(c) => (c, &line[c.len_utf8()..]),
            };
            match kind {
                ' ' if old_left > 0 && new_left > 0 => {
                    old_left -= 1;
                    new_left -= 1;
                    lines.push(HunkLine::Context(body.to_string()));
                }
                '-' if old_left > 0 => {
                    old_left -= 1;
                    lines.push(HunkLine::Remove(body.to_string()));
                }
                '+' if new_left > 0 => {
                    new_left -= 1;
                    lines.push(HunkLine::Add(body.to_string()));
                }
                NO_NEWLINE_MARKER => {}
                ' ' => {
                    return Err(Error::malformed(
                        self.line_no(),
                        format!(
                            "context line does not fit the counts of hunk at line {header_line}: \
                             {old_left} original and {new_left} revised lines left, the header counts are inconsistent"
                        ),
                    ));
                }
                '-' | '+' => {
                    let side = if kind == '-' { "removed" } else { "added" };
                    return Err(Error::malformed(
                        self.line_no(),
                        format!("hunk at line {header_line} has more {side} lines than its header declares"),
                    ));
                }
                _ => {
                    return Err(Error::malformed(
                        self.line_no(),
                        format!("unexpected line in hunk body: {line:?}"),
                    ));
                }
            }
            self.pos += 1;
        }

        Ok(Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines,
        })
    }

    fn short_hunk(&self, header_line: usize, old_left: usize, new_left: usize) -> Error {
        Error::malformed(
            self.line_no(),
            format!(
                "hunk at line {header_line} ends early: {old_left} original and {new_left} revised lines missing"
            ),
        )
    }
}

/// Path from a `---`/`+++` header, without any trailing timestamp.
fn header_path(rest: &str) -> String {
    rest.split('\t').next().unwrap_or(rest).trim_end().to_string()
}

/// Parse `@@ -l[,s] +l[,s] @@[ section]` into 0-based starts and lengths.
fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].split_once(" +")?;
    let (old_start, old_len) = parse_range(old)?;
    let (new_start, new_len) = parse_range(new)?;
    Some((old_start, old_len, new_start, new_len))
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, len) = match range.split_once(',') {
        Some((start, len)) => (start.parse::<usize>().ok()?, len.parse::<usize>().ok()?),
        None => (range.parse::<usize>().ok()?, 1),
    };
    if len == 0 {
        Some((start, 0))
    } else {
        Some((start.checked_sub(1)?, len))
    }
}
