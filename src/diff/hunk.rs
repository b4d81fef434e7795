//! Unified diff hunk headers

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DiffError;

/// `@@ -before_start[,before_len] +after_start[,after_len] @@ [section]`
static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

/// Line ranges of a hunk
///
/// Git omits a length of 1, so `@@ -3 +3 @@` parses with both lengths 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkHeader {
    pub before_start: u32,
    pub before_len: u32,
    pub after_start: u32,
    pub after_len: u32,
}

impl HunkHeader {
    /// Parse a header line; `line` is its 1-based position for error reports
    pub fn parse(header: &str, line: usize) -> Result<Self, DiffError> {
        let malformed = || DiffError::MalformedHeader {
            line,
            header: header.trim_end().to_string(),
        };

        let caps = HUNK_HEADER.captures(header).ok_or_else(malformed)?;
        let number = |index: usize, default: Option<u32>| -> Result<u32, DiffError> {
            match caps.get(index) {
                Some(m) => m.as_str().parse().map_err(|_| malformed()),
                None => default.ok_or_else(malformed),
            }
        };

        Ok(Self {
            before_start: number(1, None)?,
            before_len: number(2, Some(1))?,
            after_start: number(3, None)?,
            after_len: number(4, Some(1))?,
        })
    }

    /// First and last after-file line the hunk covers (inclusive)
    ///
    /// A pure deletion covers no after-file lines; it is anchored at
    /// `after_start` so selections can still reach it.
    pub fn after_span(&self) -> (u32, u32) {
        let start = self.after_start;
        (start, start + self.after_len.saturating_sub(1))
    }
}

/// A hunk located inside a larger diff text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk<'a> {
    pub header: HunkHeader,
    /// Header line plus body lines, line endings preserved
    pub lines: Vec<&'a str>,
    /// 1-based line of the header in the diff text
    pub diff_start: usize,
    /// 1-based line of the last body line in the diff text
    pub diff_end: usize,
}

impl Hunk<'_> {
    /// Body lines without the header
    pub fn body(&self) -> &[&str] {
        self.lines.get(1..).unwrap_or_default()
    }
}
