//! Unified diff model and parser.
//!
//! A [`PatchSet`] is a list of [`FileDiff`]s, each owning its [`Hunk`]s, each
//! owning its [`Line`]s. The tree is built once from `git diff` output and is
//! never restructured afterwards; reconstruction produces new trees.

pub mod file;
pub mod full;
pub mod hunk;

pub use file::{ChangeKind, FileDiff, FileHeader};
pub use full::PatchSet;
pub use hunk::{Hunk, HunkHeader, Line, LineKind};

use error_set::error_set;

error_set! {
    /// Errors from parsing unified diff text
    ParseError := {
        /// The diff text does not follow the unified diff grammar
        #[display("Malformed patch at line {line} ({location}): {reason}")]
        MalformedPatch {
            line: usize,
            location: String,
            reason: String,
        },
    }
}

impl ParseError {
    pub(crate) fn malformed(line: usize, location: &str, reason: impl Into<String>) -> Self {
        ParseError::MalformedPatch {
            line,
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

/// Line-by-line cursor over diff text that remembers input line numbers.
///
/// Lines are split on `\n` only, so a `\r` belonging to CRLF content stays
/// part of the line text. A missing terminator on the last line is tolerated.
pub(crate) struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let mut lines: Vec<&str> = text.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }
        Self { lines, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    pub(crate) fn next_line(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    /// 1-based number of the line [`peek`](Self::peek) would return.
    pub(crate) fn line_number(&self) -> usize {
        self.pos + 1
    }
}

/// Undo git's C-style path quoting (`"a/t\303\251st\tx"`).
///
/// Unquoted input is returned as-is.
pub(crate) fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match chars.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'v') => bytes.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Quote a path the way git does when it contains special bytes.
pub(crate) fn quote_path(path: &str) -> String {
    let needs_quoting = path
        .bytes()
        .any(|b| b == b'"' || b == b'\\' || b < 0x20 || b >= 0x7f);
    if !needs_quoting {
        return path.to_string();
    }

    let mut quoted = String::with_capacity(path.len() + 2);
    quoted.push('"');
    for b in path.bytes() {
        match b {
            b'"' => quoted.push_str("\\\""),
            b'\\' => quoted.push_str("\\\\"),
            b'\n' => quoted.push_str("\\n"),
            b'\t' => quoted.push_str("\\t"),
            b'\r' => quoted.push_str("\\r"),
            0x20..=0x7e => quoted.push(char::from(b)),
            _ => quoted.push_str(&format!("\\{b:03o}")),
        }
    }
    quoted.push('"');
    quoted
}

/// Strip git's `a/` or `b/` prefix from a (possibly quoted) path.
///
/// Returns `None` for `/dev/null`.
pub(crate) fn strip_side_prefix(raw: &str) -> Option<String> {
    let path = unquote_path(raw.trim_end_matches('\t'));
    if path == "/dev/null" {
        return None;
    }
    Some(
        path.strip_prefix("a/")
            .or_else(|| path.strip_prefix("b/"))
            .unwrap_or(&path)
            .to_string(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn cursor_keeps_carriage_returns() {
        let mut cursor = LineCursor::new("+a\r\n+b\r\n");
        assert_eq!(cursor.next_line(), Some("+a\r"));
        assert_eq!(cursor.next_line(), Some("+b\r"));
        assert_eq!(cursor.next_line(), None);
    }

    #[test]
    fn cursor_tolerates_missing_final_terminator() {
        let mut cursor = LineCursor::new(" a\n+9");
        assert_eq!(cursor.next_line(), Some(" a"));
        assert_eq!(cursor.line_number(), 2);
        assert_eq!(cursor.next_line(), Some("+9"));
        assert_eq!(cursor.peek(), None);
    }

    #[test]
    fn cursor_on_empty_text_is_empty() {
        let cursor = LineCursor::new("");
        assert_eq!(cursor.peek(), None);
    }

    #[test]
    fn unquote_plain_path_is_identity() {
        assert_eq!(unquote_path("a/src/lib.rs"), "a/src/lib.rs");
    }

    #[test]
    fn unquote_escapes_and_octal() {
        assert_eq!(unquote_path(r#""a/t\303\251st\tx""#), "a/tést\tx");
        assert_eq!(unquote_path(r#""b/quote\"d""#), "b/quote\"d");
    }

    #[test]
    fn quote_matches_git_style() {
        assert_eq!(quote_path("a/plain.rs"), "a/plain.rs");
        assert_eq!(quote_path("a/tést"), r#""a/t\303\251st""#);
        assert_eq!(unquote_path(&quote_path("b/tab\there")), "b/tab\there");
    }

    #[test]
    fn side_prefix_and_dev_null() {
        assert_eq!(strip_side_prefix("a/src/main.rs").as_deref(), Some("src/main.rs"));
        assert_eq!(strip_side_prefix("b/src/main.rs").as_deref(), Some("src/main.rs"));
        assert_eq!(strip_side_prefix("/dev/null"), None);
    }
}
