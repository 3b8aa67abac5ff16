use super::file::FileDiff;
use super::{LineCursor, ParseError};
use std::fmt;
use tracing::debug;

/// A complete git diff containing changes for multiple files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    pub files: Vec<FileDiff>,
}

impl PatchSet {
    /// Parse a complete git diff output into file diffs.
    ///
    /// Blank input yields an empty set. Anything before the first
    /// `diff --git` line other than blank lines is rejected.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut cursor = LineCursor::new(text);
        while cursor.peek().is_some_and(|line| line.trim().is_empty()) {
            cursor.next_line();
        }

        let mut files = Vec::new();
        while let Some(line) = cursor.peek() {
            if !line.starts_with("diff --git ") {
                return Err(ParseError::malformed(
                    cursor.line_number(),
                    "patch",
                    format!("expected 'diff --git' file header, found '{line}'"),
                ));
            }
            files.push(FileDiff::parse(&mut cursor)?);
        }

        debug!(
            files = files.len(),
            hunks = files.iter().map(|file| file.hunks.len()).sum::<usize>(),
            "parsed patch"
        );
        Ok(PatchSet { files })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl fmt::Display for PatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.files.iter().try_for_each(|file| write!(f, "{file}"))
    }
}
