//! Hunk selection for partial staging
//!
//! Splits a multi-file diff into file sections and hunks, then rebuilds a
//! patch holding only the hunks that overlap a set of line selections. The
//! result is meant for `git apply --cached` on stdin.

use super::{Hunk, HunkHeader};
use crate::error::DiffError;

/// One file section of a diff
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileDiff<'a> {
    /// `diff --git`, `index`, `---` and `+++` lines
    pub header: Vec<&'a str>,
    pub hunks: Vec<Hunk<'a>>,
}

/// A diff split into sections
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitDiff<'a> {
    /// Lines before the first file section
    pub preamble: Vec<&'a str>,
    pub files: Vec<FileDiff<'a>>,
}

impl SplitDiff<'_> {
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }
}

/// Inclusive 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSelection {
    pub start: u32,
    pub end: u32,
}

impl LineSelection {
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn line(line: u32) -> Self {
        Self::new(line, line)
    }

    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        self.end >= start && self.start <= end
    }
}

impl std::str::FromStr for LineSelection {
    type Err = String;

    /// `12` or `12-20`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid line number: {:?}", part))
        };
        match s.split_once('-') {
            Some((start, end)) => Ok(Self::new(number(start)?, number(end)?)),
            None => Ok(Self::line(number(s)?)),
        }
    }
}

/// Which coordinates a selection is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Lines of the working-tree file
    AfterFile,
    /// Lines of the diff text itself, as shown in a diff view
    DiffText,
}

/// Split a diff into file sections and hunks
///
/// Hunks that appear before any `diff` line belong to a file section whose
/// header is the preamble, which covers plain `diff -u` output.
pub fn split_files(text: &str) -> Result<SplitDiff<'_>, DiffError> {
    let mut split = SplitDiff::default();

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let line_num = index + 1;

        if line.starts_with("diff") {
            split.files.push(FileDiff {
                header: vec![line],
                hunks: Vec::new(),
            });
            continue;
        }

        if line.starts_with("@@") {
            let header = HunkHeader::parse(line, line_num)?;
            if split.files.is_empty() {
                let header_lines = std::mem::take(&mut split.preamble);
                split.files.push(FileDiff {
                    header: header_lines,
                    hunks: Vec::new(),
                });
            }
            if let Some(file) = split.files.last_mut() {
                file.hunks.push(Hunk {
                    header,
                    lines: vec![line],
                    diff_start: line_num,
                    diff_end: line_num,
                });
            }
            continue;
        }

        match split.files.last_mut() {
            Some(file) => match file.hunks.last_mut() {
                Some(hunk) => {
                    hunk.lines.push(line);
                    hunk.diff_end = line_num;
                }
                None => file.header.push(line),
            },
            None => split.preamble.push(line),
        }
    }

    Ok(split)
}

/// Build a patch holding only hunks that overlap `selections`
///
/// Returns `None` when nothing is selected. A file header is emitted once,
/// before the first selected hunk of that file.
pub fn select_hunks(
    text: &str,
    selections: &[LineSelection],
    mode: SelectMode,
) -> Result<Option<String>, DiffError> {
    let split = split_files(text)?;
    let mut patch: String = split.preamble.concat();
    let mut selected = false;

    for file in &split.files {
        let mut header_written = false;
        for hunk in &file.hunks {
            let (start, end) = match mode {
                SelectMode::AfterFile => hunk.header.after_span(),
                SelectMode::DiffText => (hunk.diff_start as u32, hunk.diff_end as u32),
            };
            if !selections.iter().any(|sel| sel.overlaps(start, end)) {
                continue;
            }
            if !header_written {
                patch.extend(file.header.iter().copied());
                header_written = true;
            }
            patch.extend(hunk.lines.iter().copied());
            selected = true;
        }
    }

    Ok(selected.then_some(patch))
}
