//! Selection state over a parsed [`PatchSet`].
//!
//! Nodes live in one arena and refer to each other by [`NodeId`]. Only
//! added and removed lines are line nodes; context lines always travel with
//! the changes around them and carry no state. A file that can only be taken
//! whole keeps its flag on the file node, every other file keeps flags on
//! its lines. A file whose header changes it on its own (rename, copy, mode
//! change) also uses the file node's flag for that header change, which is
//! set whenever any of its lines is and may stay set with no line selected.
//! File and hunk selection is otherwise derived from the flags below them.

use crate::diff::{LineKind, PatchSet};
use tracing::trace;

/// Index of a node in a [`SelectionTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a node points into the patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File { file: usize },
    Hunk { file: usize, hunk: usize },
    /// `line` indexes [`Hunk::lines`](crate::diff::Hunk::lines), context included
    Line { file: usize, hunk: usize, line: usize },
}

impl NodeKind {
    pub fn file(self) -> usize {
        match self {
            NodeKind::File { file } | NodeKind::Hunk { file, .. } | NodeKind::Line { file, .. } => {
                file
            }
        }
    }
}

/// Derived selection state of a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    None,
    Partial,
    All,
}

impl From<bool> for Aggregate {
    fn from(selected: bool) -> Self {
        if selected { Aggregate::All } else { Aggregate::None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    selected: bool,
    fold: Fold,
}

/// The session's patch together with its selection and fold state.
#[derive(Debug, Clone)]
pub struct SelectionTree {
    patch: PatchSet,
    nodes: Vec<Node>,
    files: Vec<NodeId>,
}

impl SelectionTree {
    /// Build the tree with every change selected.
    ///
    /// Files start collapsed unless the patch touches a single file; hunks
    /// start expanded.
    pub fn new(patch: PatchSet) -> Self {
        let file_fold = if patch.files.len() == 1 {
            Fold::Expanded
        } else {
            Fold::Collapsed
        };

        let mut tree = SelectionTree {
            patch: PatchSet::default(),
            nodes: Vec::new(),
            files: Vec::new(),
        };

        for (f, file) in patch.files.iter().enumerate() {
            let file_id = tree.push(NodeKind::File { file: f }, None, file_fold);
            tree.files.push(file_id);
            for (h, hunk) in file.hunks.iter().enumerate() {
                let hunk_id = tree.push(NodeKind::Hunk { file: f, hunk: h }, Some(file_id), Fold::Expanded);
                for (l, line) in hunk.lines.iter().enumerate() {
                    if line.kind.is_change() {
                        tree.push(
                            NodeKind::Line { file: f, hunk: h, line: l },
                            Some(hunk_id),
                            Fold::Expanded,
                        );
                    }
                }
            }
        }

        tree.patch = patch;
        tree
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>, fold: Fold) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            selected: true,
            fold,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub fn patch(&self) -> &PatchSet {
        &self.patch
    }

    /// File nodes in patch order
    pub fn roots(&self) -> &[NodeId] {
        &self.files
    }

    pub fn file_node(&self, file: usize) -> Option<NodeId> {
        self.files.get(file).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node, parents before their children
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Siblings of `id` including itself, in order
    pub fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.parent(id) {
            Some(parent) => self.children(parent),
            None => &self.files,
        }
    }

    /// Line node for `line` of the hunk behind `hunk_node`, if it is a change.
    pub fn line_node(&self, hunk_node: NodeId, line: usize) -> Option<NodeId> {
        self.children(hunk_node)
            .iter()
            .copied()
            .find(|&child| matches!(self.kind(child), NodeKind::Line { line: l, .. } if l == line))
    }

    fn is_atomic_file(&self, file: usize) -> bool {
        self.patch.files.get(file).is_some_and(|file| file.is_atomic())
    }

    /// Non-atomic file whose header change can be staged on its own
    fn has_header_flag(&self, file: usize) -> bool {
        self.patch
            .files
            .get(file)
            .is_some_and(|file| !file.is_atomic() && file.header.has_meta_change())
    }

    /// Whether the header change of file `file` is selected. Files without
    /// one report `false`.
    pub fn header_selected(&self, file: usize) -> bool {
        self.has_header_flag(file) && self.nodes[self.files[file].0].selected
    }

    /// Flag that decides an atomic file, shared by all of its nodes.
    fn atomic_flag(&self, id: NodeId) -> Option<bool> {
        let file = self.kind(id).file();
        self.is_atomic_file(file)
            .then(|| self.nodes[self.files[file].0].selected)
    }

    fn for_each_line(&self, id: NodeId, f: &mut impl FnMut(&Node)) {
        let node = &self.nodes[id.0];
        if let NodeKind::Line { .. } = node.kind {
            f(node);
        }
        for &child in &node.children {
            self.for_each_line(child, f);
        }
    }

    fn set_lines(&mut self, id: NodeId, selected: bool) {
        if let NodeKind::Line { .. } = self.nodes[id.0].kind {
            self.nodes[id.0].selected = selected;
        }
        for i in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[i];
            self.set_lines(child, selected);
        }
    }

    /// Selection state of everything below (and including) `id`.
    pub fn aggregate(&self, id: NodeId) -> Aggregate {
        if let Some(selected) = self.atomic_flag(id) {
            return selected.into();
        }
        let (mut on, mut total) = (0usize, 0usize);
        if let NodeKind::File { file } = self.kind(id)
            && self.has_header_flag(file)
        {
            total += 1;
            on += usize::from(self.nodes[id.0].selected);
        }
        self.for_each_line(id, &mut |node| {
            total += 1;
            if node.selected {
                on += 1;
            }
        });
        match on {
            0 => Aggregate::None,
            n if n == total => Aggregate::All,
            _ => Aggregate::Partial,
        }
    }

    /// Flip a line, or set a whole file or hunk to the opposite of its
    /// current aggregate (`Partial` counts as not selected).
    pub fn toggle(&mut self, id: NodeId) {
        let target = self.aggregate(id) != Aggregate::All;
        self.set_selected(id, target);
        trace!(node = id.0, kind = ?self.kind(id), selected = target, "toggled");
    }

    /// Set every change under `id` to `selected`.
    ///
    /// Inside a file that can only be taken whole this sets the whole file.
    /// Selecting anything in a file with a header change selects the header
    /// change too; only the file node itself deselects it.
    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        let file = self.kind(id).file();
        let file_id = self.files[file];
        if self.is_atomic_file(file) {
            self.nodes[file_id.0].selected = selected;
            return;
        }
        self.set_lines(id, selected);
        if self.has_header_flag(file) && (selected || id == file_id) {
            self.nodes[file_id.0].selected = selected;
        }
    }

    pub fn select_all(&mut self) {
        self.set_everything(true);
    }

    pub fn select_none(&mut self) {
        self.set_everything(false);
    }

    fn set_everything(&mut self, selected: bool) {
        for node in &mut self.nodes {
            node.selected = selected;
        }
    }

    /// Aggregate over the whole patch
    pub fn overall(&self) -> Aggregate {
        let mut states = self.files.iter().map(|&id| self.aggregate(id));
        let Some(first) = states.next() else {
            return Aggregate::None;
        };
        states.fold(first, |acc, state| if acc == state { acc } else { Aggregate::Partial })
    }

    /// Whether file `file` is selected, for files taken whole.
    pub fn file_selected(&self, file: usize) -> bool {
        self.files
            .get(file)
            .is_some_and(|&id| self.aggregate(id) == Aggregate::All)
    }

    /// Inclusion flag for every line of a hunk; context lines are `true`.
    pub fn line_flags(&self, file: usize, hunk: usize) -> Vec<bool> {
        let Some(lines) = self
            .patch
            .files
            .get(file)
            .and_then(|f| f.hunks.get(hunk))
            .map(|h| &h.lines)
        else {
            return Vec::new();
        };

        if self.is_atomic_file(file) {
            let selected = self.file_selected(file);
            return lines
                .iter()
                .map(|line| line.kind == LineKind::Context || selected)
                .collect();
        }

        let mut flags = vec![true; lines.len()];
        let hunk_node = self
            .children(self.files[file])
            .get(hunk)
            .copied();
        if let Some(hunk_node) = hunk_node {
            for &child in self.children(hunk_node) {
                if let NodeKind::Line { line, .. } = self.kind(child) {
                    flags[line] = self.nodes[child.0].selected;
                }
            }
        }
        flags
    }

    /// (selected, total) over changed lines; files without lines count as
    /// one, a header change counts as one more.
    pub fn selected_count(&self) -> (usize, usize) {
        let mut selected = 0;
        let mut total = 0;
        for (f, file) in self.patch.files.iter().enumerate() {
            let changes: usize = file.hunks.iter().map(|hunk| hunk.change_count()).sum();
            let header = usize::from(self.has_header_flag(f));
            let weight = changes.max(1) + header;
            total += weight;
            selected += match self.aggregate(self.files[f]) {
                Aggregate::All => weight,
                Aggregate::None => 0,
                Aggregate::Partial => {
                    self.lines_selected(self.files[f]) + usize::from(self.header_selected(f))
                }
            };
        }
        (selected, total)
    }

    fn lines_selected(&self, id: NodeId) -> usize {
        let mut count = 0;
        self.for_each_line(id, &mut |node| count += usize::from(node.selected));
        count
    }

    pub fn fold(&self, id: NodeId) -> Fold {
        self.nodes[id.0].fold
    }

    /// Change the fold of a file or hunk; lines have no fold.
    pub fn set_fold(&mut self, id: NodeId, fold: Fold) {
        if !matches!(self.kind(id), NodeKind::Line { .. }) {
            self.nodes[id.0].fold = fold;
        }
    }

    pub fn toggle_fold(&mut self, id: NodeId) {
        let fold = match self.fold(id) {
            Fold::Expanded => Fold::Collapsed,
            Fold::Collapsed => Fold::Expanded,
        };
        self.set_fold(id, fold);
    }

    /// Whether `id` shows its children: an expanded file or hunk with any.
    pub fn is_open(&self, id: NodeId) -> bool {
        self.fold(id) == Fold::Expanded && !self.children(id).is_empty()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod proptests {
    use super::tests::SAMPLE;
    use super::*;
    use proptest::prelude::*;

    fn children_agree(tree: &SelectionTree, id: NodeId) -> bool {
        let children = tree.children(id);
        if children.is_empty() {
            return true;
        }
        let states: Vec<Aggregate> = children.iter().map(|&c| tree.aggregate(c)).collect();
        let expected = if states.iter().all(|&s| s == Aggregate::All) {
            Aggregate::All
        } else if states.iter().all(|&s| s == Aggregate::None) {
            Aggregate::None
        } else {
            Aggregate::Partial
        };
        tree.aggregate(id) == expected
    }

    proptest! {
        #[test]
        fn aggregate_consistent_after_toggles(toggles in prop::collection::vec(any::<prop::sample::Index>(), 0..40)) {
            let mut tree = SelectionTree::new(PatchSet::parse(SAMPLE).unwrap());
            for index in toggles {
                tree.toggle(NodeId(index.index(tree.len())));
                for id in (0..tree.len()).map(NodeId) {
                    prop_assert!(children_agree(&tree, id), "node {} disagrees", id.index());
                }
            }
        }

        #[test]
        fn binary_never_partial(toggles in prop::collection::vec(any::<prop::sample::Index>(), 0..20)) {
            let mut tree = SelectionTree::new(PatchSet::parse(SAMPLE).unwrap());
            for index in toggles {
                tree.toggle(NodeId(index.index(tree.len())));
                prop_assert_ne!(tree.aggregate(tree.roots()[1]), Aggregate::Partial);
            }
        }
    }
}
