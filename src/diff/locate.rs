//! Map a row of a diff view back to a file position

use serde::{Deserialize, Serialize};

use super::HunkHeader;
use crate::error::DiffError;

/// File and 1-based line a diff row corresponds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLocation {
    pub file: String,
    pub line: u32,
}

/// Locate the working-tree position of `row` (0-based) in `text`
///
/// Walks upward to the nearest hunk header and then to its `+++ b/` file
/// header. Deleted lines do not exist in the after file and so do not
/// advance the position.
pub fn locate(text: &str, row: usize) -> Result<DiffLocation, DiffError> {
    let lines: Vec<&str> = text.lines().collect();
    let visible = lines.get(..=row).ok_or(DiffError::NoHunkInfo)?;

    let mut hunk: Option<(usize, &str)> = None;
    let mut offset: u32 = 0;
    let mut file: Option<&str> = None;

    for (index, line) in visible.iter().enumerate().rev() {
        if hunk.is_none() {
            if line.starts_with("@@") {
                hunk = Some((index, line));
            } else if !line.starts_with('-') && !line.starts_with('\\') {
                offset += 1;
            }
        } else if let Some(path) = line.strip_prefix("+++ b/") {
            file = Some(path.trim_end());
            break;
        }
    }

    let (index, header) = hunk.ok_or(DiffError::NoHunkInfo)?;
    let header = HunkHeader::parse(header, index + 1)?;
    let file = file.ok_or(DiffError::NoFileHeader)?;

    Ok(DiffLocation {
        file: file.to_string(),
        line: (header.after_start + offset).saturating_sub(1).max(1),
    })
}
