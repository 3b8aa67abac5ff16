//! Re-slicing of hunks into the staged and remainder halves.
//!
//! Every line of a hunk belongs to some of three images: the pre-image, the
//! intermediate image (pre-image plus the selected changes) and the
//! post-image. The staged half of a hunk is its projection from pre to
//! intermediate, the remainder half its projection from intermediate to post.
//!
//! | line                | pre | mid | post |
//! |---------------------|-----|-----|------|
//! | context             |  x  |  x  |  x   |
//! | removed, selected   |  x  |     |      |
//! | removed, unselected |  x  |  x  |      |
//! | added, selected     |     |  x  |  x   |
//! | added, unselected   |     |     |  x   |
//!
//! A line present in both projected images is context, one present only in
//! the source is a removal, one present only in the target an addition.

use crate::diff::{Hunk, Line, LineKind};
use error_set::error_set;
use tracing::trace;

error_set! {
    /// Errors from re-slicing hunks
    ReconstructError := {
        /// Selection flags that cannot describe a valid change of the hunk
        #[display("Reslicing conflict in {file}, hunk {hunk}: {reason}")]
        ReslicingConflict {
            file: String,
            hunk: usize,
            reason: String,
        },
    }
}

/// Which half of the selection a re-sliced hunk describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Selected changes, applied to the pre-image
    Staged,
    /// Unselected changes, applied on top of the staged result
    Remainder,
}

#[derive(Debug, Clone, Copy)]
struct Presence {
    pre: bool,
    mid: bool,
    post: bool,
}

impl Presence {
    fn of(kind: LineKind, selected: bool) -> Self {
        let (pre, mid, post) = match (kind, selected) {
            (LineKind::Context, _) => (true, true, true),
            (LineKind::Removed, true) => (true, false, false),
            (LineKind::Removed, false) => (true, true, false),
            (LineKind::Added, true) => (false, true, true),
            (LineKind::Added, false) => (false, false, true),
        };
        Presence { pre, mid, post }
    }

    /// Membership in the (source, target) images of `side`
    fn project(self, side: Side) -> (bool, bool) {
        match side {
            Side::Staged => (self.pre, self.mid),
            Side::Remainder => (self.mid, self.post),
        }
    }
}

/// Re-slices the hunks of one file in order.
///
/// Hunk positions in the intermediate image depend on what every earlier
/// hunk of the file contributed, so one `Reslicer` must see all hunks of a
/// file, including those whose half comes out empty.
#[derive(Debug)]
pub struct Reslicer<'a> {
    file: &'a str,
    hunk: usize,
    /// Lines the selected changes of earlier hunks added (mid minus pre)
    staged_shift: i64,
    /// Lines the unselected changes of earlier hunks added (post minus mid)
    remainder_shift: i64,
}

impl<'a> Reslicer<'a> {
    pub fn new(file: &'a str) -> Self {
        Reslicer {
            file,
            hunk: 0,
            staged_shift: 0,
            remainder_shift: 0,
        }
    }

    fn conflict(&self, reason: impl Into<String>) -> ReconstructError {
        ReconstructError::ReslicingConflict {
            file: self.file.to_string(),
            hunk: self.hunk,
            reason: reason.into(),
        }
    }

    /// Derive the `side` half of the next hunk from its line flags.
    ///
    /// `flags` has one entry per line of the hunk; context lines must be
    /// `true`. Returns `None` when the half carries no change.
    pub fn reslice(
        &mut self,
        hunk: &Hunk,
        flags: &[bool],
        side: Side,
    ) -> Result<Option<Hunk>, ReconstructError> {
        self.hunk += 1;
        if flags.len() != hunk.lines.len() {
            return Err(self.conflict(format!(
                "{} flags for {} lines",
                flags.len(),
                hunk.lines.len()
            )));
        }

        let mut presence = Vec::with_capacity(flags.len());
        for (line, &selected) in hunk.lines.iter().zip(flags) {
            if line.kind == LineKind::Context && !selected {
                return Err(self.conflict(format!("context line ' {}' was deselected", line.text)));
            }
            presence.push(Presence::of(line.kind, selected));
        }

        let pre = hunk.header.old_position();
        let (from, to) = match side {
            Side::Staged => (
                self.position(pre, 0)?,
                self.position(pre, self.staged_shift)?,
            ),
            Side::Remainder => (
                self.position(pre, self.staged_shift)?,
                self.position(pre, self.staged_shift + self.remainder_shift)?,
            ),
        };

        let lines = project(&hunk.lines, &presence, side);

        let count = |keep: fn(&Presence) -> bool| presence.iter().copied().filter(|p| keep(p)).count() as i64;
        let pre_len = count(|p: &Presence| p.pre);
        let mid_len = count(|p: &Presence| p.mid);
        let post_len = count(|p: &Presence| p.post);
        self.staged_shift += mid_len - pre_len;
        self.remainder_shift += post_len - mid_len;

        if !lines.iter().any(|line| line.kind.is_change()) {
            trace!(file = self.file, hunk = self.hunk, ?side, "hunk half is empty");
            return Ok(None);
        }
        Ok(Some(Hunk::from_lines(
            from,
            to,
            hunk.header.section.clone(),
            lines,
        )))
    }

    fn position(&self, base: u32, shift: i64) -> Result<u32, ReconstructError> {
        u32::try_from(i64::from(base) + shift)
            .map_err(|_| self.conflict(format!("line position {base}{shift:+} is out of range")))
    }
}

/// Lines of the projection of `lines` onto the images of `side`.
fn project(lines: &[Line], presence: &[Presence], side: Side) -> Vec<Line> {
    let images: Vec<(bool, bool)> = presence.iter().map(|p| p.project(side)).collect();
    let last_from = images.iter().rposition(|&(from, _)| from);
    let last_to = images.iter().rposition(|&(_, to)| to);

    let mut out = Vec::with_capacity(lines.len());
    for (i, (line, &(in_from, in_to))) in lines.iter().zip(&images).enumerate() {
        // A line only lacks its newline where it is the last line of an image.
        let from_open = in_from && line.no_newline && last_from == Some(i);
        let to_open = in_to && line.no_newline && last_to == Some(i);
        let mut emit = |kind, no_newline| {
            out.push(Line {
                kind,
                text: line.text.clone(),
                no_newline,
            })
        };
        match (in_from, in_to) {
            (true, true) if from_open == to_open => emit(LineKind::Context, from_open),
            (true, true) => {
                emit(LineKind::Removed, from_open);
                emit(LineKind::Added, to_open);
            }
            (true, false) => emit(LineKind::Removed, from_open),
            (false, true) => emit(LineKind::Added, to_open),
            (false, false) => {}
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diff::LineCursor;
    use similar_asserts::assert_eq;

    fn hunk(text: &str) -> Hunk {
        Hunk::parse(&mut LineCursor::new(text), "test").unwrap()
    }

    fn render(hunk: Option<Hunk>) -> String {
        hunk.map(|h| h.to_string()).unwrap_or_default()
    }

    const EXAMPLE: &str = "@@ -10,3 +10,4 @@\n foo\n-bar\n+baz\n+qux\n end\n";

    #[test]
    fn selecting_one_addition_demotes_unselected_removal() {
        let original = hunk(EXAMPLE);
        let flags = [true, false, true, false, true];
        let staged = Reslicer::new("f").reslice(&original, &flags, Side::Staged).unwrap();
        insta::assert_snapshot!(render(staged), @r"
@@ -10,3 +10,4 @@
 foo
 bar
+baz
 end
");
    }

    #[test]
    fn remainder_of_one_addition() {
        let original = hunk(EXAMPLE);
        let flags = [true, false, true, false, true];
        let rest = Reslicer::new("f").reslice(&original, &flags, Side::Remainder).unwrap();
        insta::assert_snapshot!(render(rest), @r"
@@ -10,4 +10,4 @@
 foo
-bar
 baz
+qux
 end
");
    }

    #[test]
    fn deselected_removal_with_selected_addition_keeps_both() {
        let original = hunk("@@ -3 +3 @@\n-R\n+A\n");
        let staged = Reslicer::new("f")
            .reslice(&original, &[false, true], Side::Staged)
            .unwrap()
            .unwrap();
        assert_eq!(staged.lines, vec![Line::context("R"), Line::added("A")]);
        assert_eq!(staged.header.to_string(), "@@ -3 +3,2 @@");
    }

    #[test]
    fn all_selected_reproduces_hunk() {
        let original = hunk(EXAMPLE);
        let staged = Reslicer::new("f")
            .reslice(&original, &[true; 5], Side::Staged)
            .unwrap();
        assert_eq!(staged, Some(original));
    }

    #[test]
    fn nothing_selected_is_omitted() {
        let original = hunk(EXAMPLE);
        let staged = Reslicer::new("f")
            .reslice(&original, &[true, false, false, false, true], Side::Staged)
            .unwrap();
        assert_eq!(staged, None);
    }

    #[test]
    fn later_hunks_shift_by_earlier_selection() {
        let first = hunk("@@ -1,2 +1,4 @@\n a\n+x\n+y\n b\n");
        let second = hunk("@@ -10 +12 @@\n-c\n+d\n");
        let first_flags = [true, true, false, true];

        let mut staged = Reslicer::new("f");
        assert_eq!(
            render(staged.reslice(&first, &first_flags, Side::Staged).unwrap()),
            "@@ -1,2 +1,3 @@\n a\n+x\n b\n"
        );
        assert_eq!(
            render(staged.reslice(&second, &[true, true], Side::Staged).unwrap()),
            "@@ -10 +11 @@\n-c\n+d\n"
        );

        let mut rest = Reslicer::new("f");
        assert_eq!(
            render(rest.reslice(&first, &first_flags, Side::Remainder).unwrap()),
            "@@ -1,3 +1,4 @@\n a\n x\n+y\n b\n"
        );
        assert_eq!(rest.reslice(&second, &[true, true], Side::Remainder).unwrap(), None);
    }

    #[test]
    fn omitted_hunk_still_counts_for_remainder() {
        let first = hunk("@@ -1,0 +2,2 @@\n+x\n+y\n");
        let second = hunk("@@ -10 +12 @@\n-c\n+d\n");

        let mut staged = Reslicer::new("f");
        assert_eq!(staged.reslice(&first, &[false, false], Side::Staged).unwrap(), None);
        assert_eq!(
            render(staged.reslice(&second, &[true, true], Side::Staged).unwrap()),
            "@@ -10 +10 @@\n-c\n+d\n"
        );

        let mut rest = Reslicer::new("f");
        assert_eq!(
            render(rest.reslice(&first, &[false, false], Side::Remainder).unwrap()),
            "@@ -1,0 +2,2 @@\n+x\n+y\n"
        );
        assert_eq!(rest.reslice(&second, &[true, true], Side::Remainder).unwrap(), None);
    }

    #[test]
    fn missing_newline_moves_to_the_new_last_line() {
        // "a" without newline becomes "a\n"; stage only the addition.
        let original = hunk("@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+a\n");
        let flags = [false, true];

        let staged = Reslicer::new("f").reslice(&original, &flags, Side::Staged).unwrap();
        insta::assert_snapshot!(render(staged), @r"
@@ -1 +1,2 @@
-a
\ No newline at end of file
+a
+a
");

        let rest = Reslicer::new("f").reslice(&original, &flags, Side::Remainder).unwrap();
        assert_eq!(render(rest), "@@ -1,2 +1 @@\n-a\n a\n");
    }

    #[test]
    fn deselected_context_is_a_conflict() {
        let original = hunk(EXAMPLE);
        let err = Reslicer::new("src/x.rs")
            .reslice(&original, &[false, true, true, true, true], Side::Staged)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reslicing conflict in src/x.rs, hunk 1: context line ' foo' was deselected"
        );
    }

    #[test]
    fn flag_count_mismatch_is_a_conflict() {
        let original = hunk(EXAMPLE);
        let err = Reslicer::new("f")
            .reslice(&original, &[true], Side::Staged)
            .unwrap_err();
        assert!(err.to_string().contains("1 flags for 5 lines"));
    }
}
