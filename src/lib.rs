use error_set::error_set;
use std::process::Command;
use tracing::{debug, info};

pub mod diff;
pub mod patch;
pub mod reslice;
pub mod select;
pub mod ui;

pub use diff::{ParseError, PatchSet};
pub use reslice::ReconstructError;
pub use select::SelectionTree;
pub use ui::{EventSource, RecordOptions, UiError};

error_set! {
    /// Top-level error for git-select operations
    GitSelectError := {
        #[display("No changes to select from")]
        NoChanges,
        #[display("Confirmed with nothing selected")]
        EmptySelection,
        ParseError(ParseError),
        ReconstructError(ReconstructError),
        UiError(UiError),
    } || GitCommandError

    /// Errors from git command execution
    GitCommandError := {
        #[display("Failed to run git diff: {message}")]
        DiffFailed { message: String },
        #[display("git diff failed: {stderr}")]
        DiffExitError { stderr: String },
        #[display("Invalid UTF-8 in git diff output: {message}")]
        InvalidUtf8 { message: String },
        #[display("Failed to spawn git apply: {message}")]
        ApplySpawnFailed { message: String },
        #[display("Failed to get stdin handle for git apply")]
        ApplyStdinFailed,
        #[display("Failed to write patch to git apply: {message}")]
        ApplyWriteFailed { message: String },
        #[display("Failed to wait for git apply: {message}")]
        ApplyWaitFailed { message: String },
        #[display("git apply failed: {stderr}")]
        ApplyExitError { stderr: String },
    }
}

/// The two halves of a confirmed session
#[derive(Clone, Debug, PartialEq)]
pub struct Recorded {
    /// Selected changes, relative to the pre-image
    pub staged: PatchSet,
    /// Everything else, relative to the pre-image with `staged` applied
    pub remainder: PatchSet,
}

/// Let the user pick changes out of `diff_text` interactively.
///
/// Returns `None` when the session is aborted. Nothing outside the process is
/// touched; applying the result is up to the caller.
///
/// # Examples
/// ```no_run
/// # use git_select::{record, EventSource, RecordOptions};
/// let diff = std::fs::read_to_string("changes.diff").unwrap();
/// if let Some(recorded) = record(&diff, RecordOptions::default(), EventSource::Crossterm).unwrap() {
///     print!("{}", recorded.staged);
/// }
/// ```
pub fn record(
    diff_text: &str,
    options: RecordOptions,
    mut source: EventSource,
) -> Result<Option<Recorded>, GitSelectError> {
    let patch = PatchSet::parse(diff_text)?;
    let tree = SelectionTree::new(patch);
    let Some(mut controller) = ui::Controller::new(tree, options) else {
        return Err(GitSelectError::NoChanges);
    };

    if ui::run(&mut controller, &mut source)? == ui::Outcome::Aborted {
        info!("selection aborted");
        return Ok(None);
    }

    let tree = controller.into_tree();
    let staged = patch::staged(&tree)?;
    if staged.is_empty() {
        return Err(GitSelectError::EmptySelection);
    }
    let remainder = patch::remainder(&tree)?;
    debug!(
        staged_files = staged.files.len(),
        remainder_files = remainder.files.len(),
        "selection confirmed"
    );
    Ok(Some(Recorded { staged, remainder }))
}

/// Git collaborator: reads working-tree diffs and stages patches
pub struct GitSelect<'a> {
    repo_path: &'a str,
}

impl<'a> GitSelect<'a> {
    /// Create a new GitSelect for the given repository path
    pub fn new(repo_path: &'a str) -> Self {
        Self { repo_path }
    }

    /// Unstaged changes as git prints them, limited to `paths` when not empty
    ///
    /// # Examples
    /// ```no_run
    /// # use git_select::GitSelect;
    /// let git = GitSelect::new(".");
    /// let diff = git.diff(&[], 3).unwrap(); // all files
    /// let diff = git.diff(&["flake.nix".to_string()], 0).unwrap(); // one file, no context
    /// ```
    pub fn diff(&self, paths: &[String], context: u32) -> Result<String, GitCommandError> {
        let unified = format!("-U{context}");
        let mut args = vec![
            "-C",
            self.repo_path,
            "diff",
            "--no-ext-diff",
            "--no-color",
            "--binary",
            unified.as_str(),
            "--",
        ];

        args.extend(paths.iter().map(|s| s.as_str()));
        debug!(?args, "running git");

        let output =
            Command::new("git")
                .args(&args)
                .output()
                .map_err(|e| GitCommandError::DiffFailed {
                    message: e.to_string(),
                })?;

        debug!(status = %output.status, bytes = output.stdout.len(), "git diff finished");
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::DiffExitError {
                stderr: stderr.into_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| GitCommandError::InvalidUtf8 {
            message: e.to_string(),
        })
    }

    /// Apply a patch to the git index
    pub fn apply_cached(&self, patch: &PatchSet) -> Result<(), GitCommandError> {
        use std::io::Write;

        let mut child = Command::new("git")
            .args([
                "-C",
                self.repo_path,
                "apply",
                "--cached",
                "--unidiff-zero",
                "-",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| GitCommandError::ApplySpawnFailed {
                message: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .ok_or(GitCommandError::ApplyStdinFailed)?
            .write_all(patch.to_string().as_bytes())
            .map_err(|e| GitCommandError::ApplyWriteFailed {
                message: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| GitCommandError::ApplyWaitFailed {
                message: e.to_string(),
            })?;

        debug!(status = %output.status, "git apply --cached finished");
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ApplyExitError {
                stderr: stderr.into_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use crate::ui::Event;

    const DIFF: &str = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,2 +1,2 @@
-old
+new
 same
";

    #[test]
    fn empty_input_has_no_changes() {
        let err = record("", RecordOptions::default(), EventSource::testing(80, 24, Vec::<Event>::new())).unwrap_err();
        assert!(matches!(err, GitSelectError::NoChanges));
    }

    #[test]
    fn malformed_input_fails_before_the_session() {
        let err = record("garbage\n", RecordOptions::default(), EventSource::testing(80, 24, Vec::<Event>::new()))
            .unwrap_err();
        assert!(matches!(err, GitSelectError::ParseError(_)));
    }

    #[test]
    fn abort_returns_none() {
        let recorded = record(DIFF, RecordOptions::default(), EventSource::testing(80, 24, [Event::Abort]))
            .unwrap();
        assert_eq!(recorded, None);
    }

    #[test]
    fn confirm_splits_the_patch() {
        let events = [Event::Expand, Event::Down, Event::Toggle, Event::Confirm];
        let recorded = record(DIFF, RecordOptions::default(), EventSource::testing(80, 24, events))
            .unwrap()
            .unwrap();
        insta::assert_snapshot!(recorded.staged.to_string(), @r"
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,2 +1,3 @@
 old
+new
 same
");
        insta::assert_snapshot!(recorded.remainder.to_string(), @r"
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,2 @@
-old
 new
 same
");
    }
}
