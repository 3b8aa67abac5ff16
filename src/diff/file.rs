use super::hunk::Hunk;
use super::{LineCursor, ParseError, quote_path, strip_side_prefix, unquote_path};
use std::fmt;
use tracing::trace;

/// How a file changes between pre- and post-image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
}

impl ChangeKind {
    /// One-letter status in the style of `git status --short`
    pub fn letter(self) -> char {
        match self {
            ChangeKind::Modified => 'M',
            ChangeKind::Added => 'A',
            ChangeKind::Deleted => 'D',
            ChangeKind::Renamed => 'R',
            ChangeKind::Copied => 'C',
        }
    }
}

/// Everything of a file section that precedes its hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Pre-image path, `None` for added files
    pub old_path: Option<String>,
    /// Post-image path, `None` for deleted files
    pub new_path: Option<String>,
    pub change: ChangeKind,
    pub old_mode: Option<String>,
    pub new_mode: Option<String>,
    /// Verbatim lines from `diff --git` through `+++`, without terminators
    pub lines: Vec<String>,
}

impl FileHeader {
    /// Header of an in-place modification of `path` with no extended lines.
    pub fn modification(path: &str) -> Self {
        let a = quote_path(&format!("a/{path}"));
        let b = quote_path(&format!("b/{path}"));
        FileHeader {
            old_path: Some(path.to_string()),
            new_path: Some(path.to_string()),
            change: ChangeKind::Modified,
            old_mode: None,
            new_mode: None,
            lines: vec![
                format!("diff --git {a} {b}"),
                format!("--- {a}"),
                format!("+++ {b}"),
            ],
        }
    }

    /// The header for a file-level change that comes without hunks: the
    /// extended lines only, as git prints a pure mode change or rename.
    pub fn without_content(&self) -> Self {
        FileHeader {
            lines: self
                .lines
                .iter()
                .filter(|line| {
                    !(line.starts_with("index ") || line.starts_with("--- ") || line.starts_with("+++ "))
                })
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// Path shown to the user: the post-image path unless the file is deleted.
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }

    /// The header itself changes the file (rename, copy, mode, creation,
    /// deletion), independent of any hunk.
    pub fn has_meta_change(&self) -> bool {
        self.change != ChangeKind::Modified || self.new_mode.is_some()
    }

    fn absorb(&mut self, line: &str) {
        if let Some(mode) = line.strip_prefix("new file mode ") {
            self.change = ChangeKind::Added;
            self.new_mode = Some(mode.to_string());
            self.old_path = None;
        } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
            self.change = ChangeKind::Deleted;
            self.old_mode = Some(mode.to_string());
            self.new_path = None;
        } else if let Some(mode) = line.strip_prefix("old mode ") {
            self.old_mode = Some(mode.to_string());
        } else if let Some(mode) = line.strip_prefix("new mode ") {
            self.new_mode = Some(mode.to_string());
        } else if let Some(path) = line.strip_prefix("rename from ") {
            self.change = ChangeKind::Renamed;
            self.old_path = Some(unquote_path(path));
        } else if let Some(path) = line.strip_prefix("rename to ") {
            self.new_path = Some(unquote_path(path));
        } else if let Some(path) = line.strip_prefix("copy from ") {
            self.change = ChangeKind::Copied;
            self.old_path = Some(unquote_path(path));
        } else if let Some(path) = line.strip_prefix("copy to ") {
            self.new_path = Some(unquote_path(path));
        }
    }
}

/// A complete diff for a single file.
///
/// Text files own their hunks; binary files keep their body verbatim and
/// have no hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub header: FileHeader,
    pub hunks: Vec<Hunk>,
    /// Verbatim `Binary files ... differ` line or `GIT binary patch` block
    pub binary: Option<Vec<String>>,
}

impl FileDiff {
    pub fn new(header: FileHeader, hunks: Vec<Hunk>) -> Self {
        FileDiff {
            header,
            hunks,
            binary: None,
        }
    }

    pub fn path(&self) -> &str {
        self.header.path()
    }

    pub fn is_binary(&self) -> bool {
        self.binary.is_some()
    }

    /// Whether the file can only be taken as a whole.
    ///
    /// True for binary files, whole-file additions and deletions, and
    /// header-only entries such as a pure rename or mode change.
    pub fn is_atomic(&self) -> bool {
        self.is_binary()
            || matches!(self.header.change, ChangeKind::Added | ChangeKind::Deleted)
            || self.hunks.is_empty()
    }

    /// Parse one `diff --git` section from the cursor.
    ///
    /// Stops in front of the next `diff --git` line or at the end of input.
    pub(crate) fn parse(cursor: &mut LineCursor<'_>) -> Result<Self, ParseError> {
        let start = cursor.line_number();
        let first = cursor.next_line().unwrap_or_default();
        let (old_path, new_path) = first
            .strip_prefix("diff --git ")
            .and_then(split_git_paths)
            .ok_or_else(|| {
                ParseError::malformed(start, "patch", format!("invalid file header '{first}'"))
            })?;

        let mut header = FileHeader {
            old_path: Some(old_path),
            new_path: Some(new_path),
            change: ChangeKind::Modified,
            old_mode: None,
            new_mode: None,
            lines: vec![first.to_string()],
        };

        while let Some(line) = cursor.peek() {
            if starts_section(line) {
                break;
            }
            cursor.next_line();
            header.absorb(line);
            header.lines.push(line.to_string());
        }

        let mut binary = None;
        match cursor.peek() {
            Some(line) if line.starts_with("Binary files ") => {
                cursor.next_line();
                binary = Some(vec![line.to_string()]);
            }
            Some(line) if line.starts_with("GIT binary patch") => {
                let mut body = Vec::new();
                while let Some(line) = cursor.peek() {
                    if line.starts_with("diff --git ") {
                        break;
                    }
                    cursor.next_line();
                    body.push(line.to_string());
                }
                binary = Some(body);
            }
            Some(minus) if minus.starts_with("---") => {
                cursor.next_line();
                let plus_line = cursor.line_number();
                let plus = cursor
                    .next_line()
                    .filter(|line| line.starts_with("+++"))
                    .ok_or_else(|| {
                        ParseError::malformed(plus_line, header.path(), "expected '+++' after '---'")
                    })?;
                header.old_path = minus.get(4..).and_then(strip_side_prefix);
                header.new_path = plus.get(4..).and_then(strip_side_prefix);
                header.lines.push(minus.to_string());
                header.lines.push(plus.to_string());
            }
            _ => {}
        }

        let mut hunks = Vec::new();
        if binary.is_none() {
            while cursor.peek().is_some_and(|line| line.starts_with("@@")) {
                let location = format!("{}, hunk {}", header.path(), hunks.len() + 1);
                hunks.push(Hunk::parse(cursor, &location)?);
            }
        }

        if let Some(line) = cursor.peek()
            && !line.starts_with("diff --git ")
        {
            return Err(ParseError::malformed(
                cursor.line_number(),
                header.path(),
                format!("unexpected line '{line}'"),
            ));
        }

        trace!(
            path = header.path(),
            change = ?header.change,
            hunks = hunks.len(),
            binary = binary.is_some(),
            "parsed file section"
        );
        Ok(FileDiff {
            header,
            hunks,
            binary,
        })
    }
}

fn starts_section(line: &str) -> bool {
    ["diff --git ", "---", "@@", "Binary files ", "GIT binary patch"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Split the `a/... b/...` part of a `diff --git` line.
///
/// Unquoted paths may contain spaces, in which case the split that yields
/// identical names on both sides wins.
fn split_git_paths(rest: &str) -> Option<(String, String)> {
    let (old, new) = if rest.starts_with('"') {
        let end = closing_quote(rest)?;
        (&rest[..=end], rest[end + 1..].strip_prefix(' ')?)
    } else if let Some(at) = rest.find(" \"") {
        (&rest[..at], &rest[at + 1..])
    } else {
        let splits: Vec<usize> = rest.match_indices(" b/").map(|(at, _)| at).collect();
        let at = splits
            .iter()
            .copied()
            .find(|&at| rest[..at].strip_prefix("a/") == Some(&rest[at + 3..]))
            .or_else(|| splits.first().copied())?;
        (&rest[..at], &rest[at + 1..])
    };
    Some((strip_side_prefix(old)?, strip_side_prefix(new)?))
}

fn closing_quote(quoted: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in quoted.char_indices().skip(1) {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.header.lines {
            writeln!(f, "{line}")?;
        }
        match &self.binary {
            Some(body) => body.iter().try_for_each(|line| writeln!(f, "{line}")),
            None => self.hunks.iter().try_for_each(|hunk| write!(f, "{hunk}")),
        }
    }
}
