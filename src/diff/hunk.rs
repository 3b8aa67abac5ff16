use super::{LineCursor, ParseError};
use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as dec_u32},
    combinator::opt,
    sequence::preceded,
};
use std::fmt;

/// Marker git prints after a line that lacks its trailing newline.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Which image(s) a diff line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Unchanged line, present in both pre- and post-image
    Context,
    /// Line only present in the post-image
    Added,
    /// Line only present in the pre-image
    Removed,
}

impl LineKind {
    pub fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Removed => '-',
        }
    }

    pub fn is_change(self) -> bool {
        !matches!(self, LineKind::Context)
    }
}

/// One line of a hunk body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    /// Content without the leading prefix character or the line terminator
    pub text: String,
    /// Followed by `\ No newline at end of file`
    pub no_newline: bool,
}

impl Line {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            no_newline: false,
        }
    }

    pub fn context(text: impl Into<String>) -> Self {
        Self::new(LineKind::Context, text)
    }

    pub fn added(text: impl Into<String>) -> Self {
        Self::new(LineKind::Added, text)
    }

    pub fn removed(text: impl Into<String>) -> Self {
        Self::new(LineKind::Removed, text)
    }

    #[must_use]
    pub fn without_newline(mut self) -> Self {
        self.no_newline = true;
        self
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.kind.prefix(), self.text)?;
        if self.no_newline {
            writeln!(f, "{NO_NEWLINE_MARKER}")?;
        }
        Ok(())
    }
}

/// The `@@ -old_start,old_count +new_start,new_count @@ section` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Everything after the closing `@@`, usually ` fn name()` or empty
    pub section: String,
}

impl HunkHeader {
    /// Parse a hunk header line.
    ///
    /// Returns `None` if the line is not a header or its offsets are not
    /// valid integers.
    pub fn parse(line: &str) -> Option<Self> {
        header(line).ok().map(|(_, header)| header)
    }

    /// First pre-image line the hunk covers, even when it covers none.
    ///
    /// An empty range names the line *before* the hunk (`-10,0` inserts after
    /// line 10), so the covered position is one past it.
    pub fn old_position(&self) -> u32 {
        position(self.old_start, self.old_count)
    }

    /// Same as [`old_position`](Self::old_position) for the post-image.
    pub fn new_position(&self) -> u32 {
        position(self.new_start, self.new_count)
    }

    /// Inverse of [`old_position`](Self::old_position): the start value a
    /// header prints for a range at `position` spanning `count` lines.
    pub fn start_for(position: u32, count: u32) -> u32 {
        if count == 0 {
            position.saturating_sub(1)
        } else {
            position
        }
    }
}

fn position(start: u32, count: u32) -> u32 {
    if count == 0 { start.saturating_add(1) } else { start }
}

/// `start` or `start,count`; a missing count means 1
fn range(input: &str) -> IResult<&str, (u32, u32)> {
    let (input, start) = dec_u32(input)?;
    let (input, count) = opt(preceded(char(','), dec_u32)).parse(input)?;
    Ok((input, (start, count.unwrap_or(1))))
}

fn header(input: &str) -> IResult<&str, HunkHeader> {
    let (input, (old_start, old_count)) = preceded(tag("@@ -"), range).parse(input)?;
    let (input, (new_start, new_count)) = preceded(tag(" +"), range).parse(input)?;
    let (section, _) = tag(" @@").parse(input)?;
    Ok((
        "",
        HunkHeader {
            old_start,
            old_count,
            new_start,
            new_count,
            section: section.to_string(),
        },
    ))
}

struct Range(u32, u32);

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            1 => write!(f, "{}", self.0),
            n => write!(f, "{},{}", self.0, n),
        }
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{} +{} @@{}",
            Range(self.old_start, self.old_count),
            Range(self.new_start, self.new_count),
            self.section
        )
    }
}

/// A single hunk from a git diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub header: HunkHeader,
    pub lines: Vec<Line>,
}

impl Hunk {
    /// Build a hunk whose header counts are derived from its lines.
    pub fn from_lines(
        old_position: u32,
        new_position: u32,
        section: impl Into<String>,
        lines: Vec<Line>,
    ) -> Self {
        let old_count = count_where(&lines, |kind| kind != LineKind::Added);
        let new_count = count_where(&lines, |kind| kind != LineKind::Removed);
        Hunk {
            header: HunkHeader {
                old_start: HunkHeader::start_for(old_position, old_count),
                old_count,
                new_start: HunkHeader::start_for(new_position, new_count),
                new_count,
                section: section.into(),
            },
            lines,
        }
    }

    /// Parse one hunk (header line plus body) from the cursor.
    ///
    /// Consumes exactly the lines the header's counts call for, plus any
    /// `\ No newline at end of file` markers among them.
    pub(crate) fn parse(cursor: &mut LineCursor<'_>, location: &str) -> Result<Self, ParseError> {
        let header_line = cursor.line_number();
        let text = cursor.next_line().unwrap_or_default();
        let header = HunkHeader::parse(text).ok_or_else(|| {
            ParseError::malformed(header_line, location, format!("invalid hunk header '{text}'"))
        })?;

        let mut old_left = header.old_count;
        let mut new_left = header.new_count;
        let mut lines: Vec<Line> = Vec::new();

        loop {
            if old_left == 0 && new_left == 0 {
                if let Some(next) = cursor.peek()
                    && next.starts_with('\\')
                {
                    let line_no = cursor.line_number();
                    cursor.next_line();
                    mark_no_newline(&mut lines, line_no, location)?;
                }
                break;
            }

            let line_no = cursor.line_number();
            let short = || {
                ParseError::malformed(
                    line_no,
                    location,
                    format!(
                        "hunk '{header}' ends early: {old_left} pre-image and {new_left} post-image lines missing"
                    ),
                )
            };
            let Some(text) = cursor.peek() else {
                return Err(short());
            };

            let kind = match text.as_bytes().first() {
                Some(b' ') | None => LineKind::Context,
                Some(b'-') => LineKind::Removed,
                Some(b'+') => LineKind::Added,
                Some(b'\\') => {
                    cursor.next_line();
                    mark_no_newline(&mut lines, line_no, location)?;
                    continue;
                }
                _ => return Err(short()),
            };

            let fits = match kind {
                LineKind::Context => old_left > 0 && new_left > 0,
                LineKind::Removed => old_left > 0,
                LineKind::Added => new_left > 0,
            };
            if !fits {
                return Err(ParseError::malformed(
                    line_no,
                    location,
                    format!("hunk '{header}' has more lines than its header declares"),
                ));
            }
            if kind != LineKind::Added {
                old_left -= 1;
            }
            if kind != LineKind::Removed {
                new_left -= 1;
            }

            cursor.next_line();
            lines.push(Line::new(kind, text.get(1..).unwrap_or_default()));
        }

        if !lines.iter().any(|line| line.kind.is_change()) {
            return Err(ParseError::malformed(
                header_line,
                location,
                format!("hunk '{header}' contains no changes"),
            ));
        }
        check_missing_newlines(&lines).map_err(|reason| {
            ParseError::malformed(header_line, location, reason)
        })?;

        Ok(Hunk { header, lines })
    }

    /// Number of added and removed lines
    pub fn change_count(&self) -> usize {
        self.lines.iter().filter(|line| line.kind.is_change()).count()
    }

    /// Net line count change this hunk applies (post minus pre)
    pub fn delta(&self) -> i64 {
        i64::from(self.header.new_count) - i64::from(self.header.old_count)
    }
}

fn count_where(lines: &[Line], keep: impl Fn(LineKind) -> bool) -> u32 {
    lines.iter().filter(|line| keep(line.kind)).count() as u32
}

fn mark_no_newline(lines: &mut [Line], line_no: usize, location: &str) -> Result<(), ParseError> {
    match lines.last_mut() {
        Some(last) => {
            last.no_newline = true;
            Ok(())
        }
        None => Err(ParseError::malformed(
            line_no,
            location,
            "no-newline marker without a preceding line",
        )),
    }
}

/// A line lacking its newline must be the last line of every image it is in.
fn check_missing_newlines(lines: &[Line]) -> Result<(), String> {
    for (i, line) in lines.iter().enumerate() {
        if !line.no_newline {
            continue;
        }
        let later = &lines[i + 1..];
        let clash = match line.kind {
            LineKind::Context => !later.is_empty(),
            LineKind::Removed => later.iter().any(|l| l.kind != LineKind::Added),
            LineKind::Added => later.iter().any(|l| l.kind != LineKind::Removed),
        };
        if clash {
            return Err(format!(
                "line '{}{}' lacks a newline but is not the last line of its file",
                line.kind.prefix(),
                line.text
            ));
        }
    }
    Ok(())
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.lines {
            write!(f, "{line}")?;
        }
        Ok(())
    }
}
