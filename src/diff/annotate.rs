//! Per-line change classification for live annotations
//!
//! Turns `git diff -u` output into `(kind, line)` pairs in after-file
//! coordinates. A deletion immediately followed by a non-blank insertion is
//! reported as one modified line rather than a delete/insert pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::HunkHeader;
use crate::error::DiffError;

/// How a line changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "+")]
    Inserted,
    #[serde(rename = "-")]
    Deleted,
    #[serde(rename = "x")]
    Modified,
}

impl ChangeKind {
    /// Marker character used by annotation renderers
    pub fn marker(&self) -> char {
        match self {
            Self::Inserted => '+',
            Self::Deleted => '-',
            Self::Modified => 'x',
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// One classified line
///
/// `line` is 1-based in the after file. For `Deleted` it is the line the
/// removed block sat directly above, i.e. the first surviving line below
/// the deletion. This is one below the classic gutter placement, which
/// draws the `-` marker on the line above the removed block; such renderers
/// subtract one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineClassification {
    pub kind: ChangeKind,
    pub line: u32,
}

impl LineClassification {
    pub fn new(kind: ChangeKind, line: u32) -> Self {
        Self { kind, line }
    }
}

/// Scanning state for the body of one hunk
struct HunkCursor {
    /// 0-based after-file line of the next body line
    tracked: i64,
    before_left: u32,
    after_left: u32,
    deletion: bool,
    insertion: bool,
}

impl HunkCursor {
    fn new(header: &HunkHeader) -> Self {
        Self {
            tracked: i64::from(header.after_start) - 1,
            before_left: header.before_len,
            after_left: header.after_len,
            deletion: false,
            insertion: false,
        }
    }

    fn is_open(&self) -> bool {
        self.before_left > 0 || self.after_left > 0
    }

    fn push(&self, kind: ChangeKind, out: &mut Vec<LineClassification>) {
        let line = u32::try_from(self.tracked + 1).unwrap_or(0).max(1);
        out.push(LineClassification::new(kind, line));
    }

    fn feed(&mut self, line: &str, out: &mut Vec<LineClassification>) {
        match line.as_bytes().first() {
            Some(b'-') => {
                if !is_blank_change(line) {
                    self.deletion = true;
                }
                self.before_left = self.before_left.saturating_sub(1);
                self.tracked -= 1;
            }
            Some(b'+') => {
                if self.deletion {
                    if !is_blank_change(line) {
                        self.push(ChangeKind::Modified, out);
                        self.insertion = true;
                    }
                } else {
                    self.push(ChangeKind::Inserted, out);
                    self.insertion = true;
                }
                self.after_left = self.after_left.saturating_sub(1);
            }
            // No newline markers carry no line of their own
            Some(b'\\') => return,
            _ => {
                self.flush(out);
                self.before_left = self.before_left.saturating_sub(1);
                self.after_left = self.after_left.saturating_sub(1);
            }
        }
        self.tracked += 1;
    }

    /// Report a deletion that no insertion replaced
    fn flush(&mut self, out: &mut Vec<LineClassification>) {
        if self.deletion && !self.insertion {
            self.push(ChangeKind::Deleted, out);
        }
        self.deletion = false;
        self.insertion = false;
    }
}

/// `-` or `+` followed by nothing but whitespace
fn is_blank_change(line: &str) -> bool {
    line[1..].trim().is_empty()
}

/// Classify every changed line of a unified diff
///
/// Empty input means "no changes" and yields an empty list. Input that has
/// text but no hunk header yields `DiffError::NoHunkInfo`, and any malformed
/// header fails the whole parse.
pub fn parse(text: &str) -> Result<Vec<LineClassification>, DiffError> {
    if let Some(message) = git_error(text) {
        return Err(DiffError::GitError(message));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut changes = Vec::new();
    let mut cursor: Option<HunkCursor> = None;
    let mut saw_header = false;

    for (index, line) in text.lines().enumerate() {
        if line.starts_with("@@") {
            if let Some(mut done) = cursor.take() {
                done.flush(&mut changes);
            }
            let header = HunkHeader::parse(line, index + 1)?;
            cursor = Some(HunkCursor::new(&header));
            saw_header = true;
            continue;
        }

        let Some(active) = cursor.as_mut() else {
            // File headers and anything else between hunks
            continue;
        };

        if !active.is_open() && !line.starts_with('\\') {
            active.flush(&mut changes);
            cursor = None;
            continue;
        }

        active.feed(line, &mut changes);
    }

    if let Some(mut done) = cursor {
        done.flush(&mut changes);
    }

    if saw_header {
        Ok(changes)
    } else {
        Err(DiffError::NoHunkInfo)
    }
}

fn git_error(text: &str) -> Option<String> {
    let first = text.lines().next()?;
    (first.starts_with("error:") || first.starts_with("fatal:")).then(|| first.to_string())
}
