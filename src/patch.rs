//! Patch reconstruction from a [`SelectionTree`].

use crate::diff::{FileDiff, FileHeader, PatchSet};
use crate::reslice::{ReconstructError, Reslicer, Side};
use crate::select::SelectionTree;
use tracing::debug;

/// The selected changes, to be applied to the pre-image.
pub fn staged(tree: &SelectionTree) -> Result<PatchSet, ReconstructError> {
    reconstruct(tree, Side::Staged)
}

/// The unselected changes, to be applied on top of [`staged`].
pub fn remainder(tree: &SelectionTree) -> Result<PatchSet, ReconstructError> {
    reconstruct(tree, Side::Remainder)
}

/// Build the `side` half of the tree's patch.
///
/// Files taken whole are copied verbatim into the half matching their
/// selection. Other files are re-sliced hunk by hunk and dropped when no
/// hunk survives, unless the half carries the file's header change: that is
/// emitted on its own when no hunk comes with it.
pub fn reconstruct(tree: &SelectionTree, side: Side) -> Result<PatchSet, ReconstructError> {
    let mut files = Vec::new();
    for (f, file) in tree.patch().files.iter().enumerate() {
        if file.is_atomic() {
            let wanted = match side {
                Side::Staged => tree.file_selected(f),
                Side::Remainder => !tree.file_selected(f),
            };
            if wanted {
                files.push(file.clone());
            }
            continue;
        }

        let hunks = reslice_file(tree, f, file, side)?;
        let carries_header = file.header.has_meta_change()
            && match side {
                Side::Staged => tree.header_selected(f),
                Side::Remainder => !tree.header_selected(f),
            };

        let header = match (side, carries_header) {
            (_, true) if hunks.is_empty() => file.header.without_content(),
            (_, true) => file.header.clone(),
            (_, false) if hunks.is_empty() => continue,
            (Side::Remainder, false) if file.header.has_meta_change() => {
                FileHeader::modification(file.path())
            }
            (_, false) => file.header.clone(),
        };
        files.push(FileDiff::new(header, hunks));
    }

    debug!(
        ?side,
        files = files.len(),
        of = tree.patch().files.len(),
        "reconstructed patch"
    );
    Ok(PatchSet { files })
}

fn reslice_file(
    tree: &SelectionTree,
    f: usize,
    file: &FileDiff,
    side: Side,
) -> Result<Vec<crate::diff::Hunk>, ReconstructError> {
    let mut reslicer = Reslicer::new(file.path());
    let mut hunks = Vec::new();
    for (h, hunk) in file.hunks.iter().enumerate() {
        if let Some(sliced) = reslicer.reslice(hunk, &tree.line_flags(f, h), side)? {
            hunks.push(sliced);
        }
    }
    Ok(hunks)
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::select::{Aggregate, NodeKind};
    use similar_asserts::assert_eq;

    const SAMPLE: &str = "\
diff --git a/a.txt b/a.txt
index 1111111..2222222 100644
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@ intro
 one
-two
+TWO
 three
@@ -10,2 +10,3 @@
 ten
+ten and a half
 eleven
diff --git a/img.png b/img.png
index 3333333..4444444 100644
Binary files a/img.png and b/img.png differ
";

    fn tree(text: &str) -> SelectionTree {
        SelectionTree::new(PatchSet::parse(text).unwrap())
    }

    fn line(tree: &SelectionTree, file: usize, hunk: usize, line: usize) -> crate::select::NodeId {
        let hunk_node = tree.children(tree.roots()[file])[hunk];
        tree.line_node(hunk_node, line).unwrap()
    }

    #[test]
    fn everything_selected_is_the_input() {
        let tree = tree(SAMPLE);
        assert_eq!(staged(&tree).unwrap().to_string(), SAMPLE);
        assert!(remainder(&tree).unwrap().is_empty());
    }

    #[test]
    fn nothing_selected_is_empty() {
        let mut tree = tree(SAMPLE);
        tree.select_none();
        assert!(staged(&tree).unwrap().is_empty());
        assert_eq!(remainder(&tree).unwrap().to_string(), SAMPLE);
    }

    #[test]
    fn partial_selection_splits_both_halves() {
        let mut tree = tree(SAMPLE);
        let two = line(&tree, 0, 0, 1);
        tree.toggle(two);
        let binary = tree.roots()[1];
        tree.toggle(binary);
        assert_eq!(tree.aggregate(binary), Aggregate::None);

        insta::assert_snapshot!(staged(&tree).unwrap().to_string(), @r"
diff --git a/a.txt b/a.txt
index 1111111..2222222 100644
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,4 @@ intro
 one
 two
+TWO
 three
@@ -10,2 +11,3 @@
 ten
+ten and a half
 eleven
");

        insta::assert_snapshot!(remainder(&tree).unwrap().to_string(), @r"
diff --git a/a.txt b/a.txt
index 1111111..2222222 100644
--- a/a.txt
+++ b/a.txt
@@ -1,4 +1,3 @@ intro
 one
-two
 TWO
 three
diff --git a/img.png b/img.png
index 3333333..4444444 100644
Binary files a/img.png and b/img.png differ
");
    }

    #[test]
    fn file_without_surviving_hunks_is_dropped() {
        let mut tree = tree(SAMPLE);
        let a = tree.roots()[0];
        tree.toggle(a);
        let patch = staged(&tree).unwrap();
        let paths: Vec<&str> = patch.files.iter().map(|file| file.path()).collect();
        assert_eq!(paths, vec!["img.png"]);
    }

    const RENAME: &str = "\
diff --git a/old.txt b/new.txt
similarity index 90%
rename from old.txt
rename to new.txt
index 1111111..2222222 100644
--- a/old.txt
+++ b/new.txt
@@ -1,2 +1,2 @@
-a
+A
-b
+B
";

    #[test]
    fn partially_staged_rename_leaves_plain_remainder() {
        let mut tree = tree(RENAME);
        let b = line(&tree, 0, 0, 2);
        tree.toggle(b);

        let staged = staged(&tree).unwrap().to_string();
        assert!(staged.starts_with("diff --git a/old.txt b/new.txt\nsimilarity index 90%\n"));
        insta::assert_snapshot!(remainder(&tree).unwrap().to_string(), @r"
diff --git a/new.txt b/new.txt
--- a/new.txt
+++ b/new.txt
@@ -1,3 +1,2 @@
 A
-b
 B
");
    }

    #[test]
    fn unstaged_rename_keeps_header_in_remainder() {
        let mut tree = tree(RENAME);
        tree.select_none();
        assert!(staged(&tree).unwrap().is_empty());
        assert_eq!(remainder(&tree).unwrap().to_string(), RENAME);
    }

    #[test]
    fn header_only_change_is_all_or_nothing() {
        let text = "diff --git a/run.sh b/run.sh\nold mode 100644\nnew mode 100755\n";
        let mut tree = tree(text);
        assert_eq!(staged(&tree).unwrap().to_string(), text);

        tree.toggle(tree.roots()[0]);
        assert!(staged(&tree).unwrap().is_empty());
        assert_eq!(remainder(&tree).unwrap().to_string(), text);
    }

    const MODE_CHANGE: &str = "\
diff --git a/run.sh b/run.sh
old mode 100644
new mode 100755
index 1111111..2222222
--- a/run.sh
+++ b/run.sh
@@ -1,2 +1,2 @@
-echo a
+echo A
 echo b
";

    #[test]
    fn mode_change_staged_without_content() {
        let mut tree = tree(MODE_CHANGE);
        let hunk = tree.children(tree.roots()[0])[0];
        tree.toggle(hunk);

        insta::assert_snapshot!(staged(&tree).unwrap().to_string(), @r"
diff --git a/run.sh b/run.sh
old mode 100644
new mode 100755
");
        insta::assert_snapshot!(remainder(&tree).unwrap().to_string(), @r"
diff --git a/run.sh b/run.sh
--- a/run.sh
+++ b/run.sh
@@ -1,2 +1,2 @@
-echo a
+echo A
 echo b
");
    }

    #[test]
    fn rename_staged_without_content() {
        let mut tree = tree(RENAME);
        let hunk = tree.children(tree.roots()[0])[0];
        tree.toggle(hunk);

        insta::assert_snapshot!(staged(&tree).unwrap().to_string(), @r"
diff --git a/old.txt b/new.txt
similarity index 90%
rename from old.txt
rename to new.txt
");
        let rest = remainder(&tree).unwrap().to_string();
        assert!(rest.starts_with("diff --git a/new.txt b/new.txt\n--- a/new.txt\n"));
    }

    #[test]
    fn new_file_line_toggle_drops_whole_file() {
        let text = "diff --git a/n.txt b/n.txt\nnew file mode 100644\n--- /dev/null\n+++ b/n.txt\n@@ -0,0 +1,2 @@\n+x\n+y\n";
        let mut tree = tree(text);
        let y = line(&tree, 0, 0, 1);
        assert!(matches!(tree.kind(y), NodeKind::Line { line: 1, .. }));
        tree.toggle(y);
        assert!(staged(&tree).unwrap().is_empty());
        assert_eq!(remainder(&tree).unwrap().to_string(), text);
    }
}
