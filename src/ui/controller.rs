//! Interactive state machine over a [`SelectionTree`].
//!
//! The controller owns the session's tree and mutates it in place. It has no
//! notion of a terminal: events come in through [`Controller::handle`] and the
//! renderer reads the state back out.

use super::event::Event;
use crate::select::{Aggregate, Fold, NodeId, NodeKind, SelectionTree};
use tracing::debug;

/// Rows kept between the cursor and the viewport edge when scrolling
const SCROLL_MARGIN: usize = 3;

/// How a session ended
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Confirmed,
    Aborted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Browsing,
    HelpOverlay,
    /// Confirm was requested with nothing selected
    ConfirmExit,
    Done(Outcome),
}

/// Session options
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecordOptions {
    /// Ask before leaving when confirming with nothing selected. Without it,
    /// such a confirm is refused with a status message.
    pub confirm_empty: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        RecordOptions {
            confirm_empty: true,
        }
    }
}

/// Highlighted node plus the first visible row
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    pub node: NodeId,
    pub scroll: usize,
}

/// One screen row of the flattened tree
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Row {
    File(NodeId),
    Hunk(NodeId),
    /// A context line; never selectable
    Context { file: usize, hunk: usize, line: usize },
    Line(NodeId),
}

impl Row {
    pub fn node(self) -> Option<NodeId> {
        match self {
            Row::File(id) | Row::Hunk(id) | Row::Line(id) => Some(id),
            Row::Context { .. } => None,
        }
    }
}

pub struct Controller {
    tree: SelectionTree,
    options: RecordOptions,
    mode: Mode,
    cursor: Cursor,
    /// Rows available for the tree, below the status bar
    height: usize,
    width: u16,
    message: Option<String>,
}

impl Controller {
    /// Start browsing `tree` with the cursor on its first file.
    ///
    /// Returns `None` for a tree without files.
    pub fn new(tree: SelectionTree, options: RecordOptions) -> Option<Self> {
        let first = tree.roots().first().copied()?;
        Some(Controller {
            tree,
            options,
            mode: Mode::Browsing,
            cursor: Cursor {
                node: first,
                scroll: 0,
            },
            height: 1,
            width: 80,
            message: None,
        })
    }

    pub fn tree(&self) -> &SelectionTree {
        &self.tree
    }

    pub fn into_tree(self) -> SelectionTree {
        self.tree
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    /// Transient status text set by the last event
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Adopt the terminal size; one row goes to the status bar.
    pub fn set_viewport(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = usize::from(height.saturating_sub(1)).max(1);
        self.scroll_to_cursor();
    }

    /// The tree flattened into rows, honoring folds.
    pub fn rows(&self) -> Vec<Row> {
        let tree = &self.tree;
        let mut rows = Vec::new();
        for &file_id in tree.roots() {
            rows.push(Row::File(file_id));
            if !tree.is_open(file_id) {
                continue;
            }
            for &hunk_id in tree.children(file_id) {
                rows.push(Row::Hunk(hunk_id));
                if !tree.is_open(hunk_id) {
                    continue;
                }
                let NodeKind::Hunk { file, hunk } = tree.kind(hunk_id) else {
                    continue;
                };
                let lines = tree
                    .patch()
                    .files
                    .get(file)
                    .and_then(|f| f.hunks.get(hunk))
                    .map_or(0, |h| h.lines.len());
                for line in 0..lines {
                    rows.push(match tree.line_node(hunk_id, line) {
                        Some(id) => Row::Line(id),
                        None => Row::Context { file, hunk, line },
                    });
                }
            }
        }
        rows
    }

    /// Rows currently on screen, with the index of the cursor among them
    pub fn visible_rows(&self) -> (Vec<Row>, Option<usize>) {
        let rows: Vec<Row> = self
            .rows()
            .into_iter()
            .skip(self.cursor.scroll)
            .take(self.height)
            .collect();
        let at = rows.iter().position(|row| row.node() == Some(self.cursor.node));
        (rows, at)
    }

    pub fn handle(&mut self, event: Event) {
        let before = self.mode;
        if !matches!(event, Event::None | Event::Resize { .. }) {
            self.message = None;
        }
        match (self.mode, event) {
            (_, Event::None) => {}
            (_, Event::Resize { width, height }) => self.set_viewport(width, height),
            (Mode::Done(_), _) => {}
            (Mode::HelpOverlay, _) => self.mode = Mode::Browsing,
            (Mode::ConfirmExit, Event::Yes) => self.mode = Mode::Done(Outcome::Aborted),
            (Mode::ConfirmExit, _) => self.mode = Mode::Browsing,
            (Mode::Browsing, event) => self.browse(event),
        }
        if self.mode != before {
            debug!(from = ?before, to = ?self.mode, "controller mode changed");
        }
    }

    fn browse(&mut self, event: Event) {
        let node = self.cursor.node;
        match event {
            Event::Up => self.step(-1),
            Event::Down => self.step(1),
            Event::PrevSibling => {
                let target = self.sibling(node, -1).or_else(|| self.tree.parent(node));
                self.move_to(target);
            }
            Event::NextSibling => {
                let target = self.sibling(node, 1).or_else(|| {
                    self.tree
                        .parent(node)
                        .and_then(|parent| self.sibling(parent, 1))
                });
                self.move_to(target);
            }
            Event::Expand => {
                self.tree.set_fold(node, Fold::Expanded);
                let first = self.tree.children(node).first().copied();
                self.move_to(first);
            }
            Event::Collapse => {
                if self.tree.is_open(node) {
                    self.tree.set_fold(node, Fold::Collapsed);
                } else {
                    let parent = self.tree.parent(node);
                    self.move_to(parent);
                }
            }
            Event::FileHeader => {
                let file = self.file_of(node);
                if file == node {
                    self.tree.set_fold(node, Fold::Collapsed);
                } else {
                    self.move_to(Some(file));
                }
            }
            Event::First => {
                let first = self.selectable().first().copied();
                self.move_to(first);
            }
            Event::Last => {
                let last = self.selectable().last().copied();
                self.move_to(last);
            }
            Event::Toggle => self.tree.toggle(node),
            Event::ToggleAll => {
                if self.tree.overall() == Aggregate::All {
                    self.tree.select_none();
                } else {
                    self.tree.select_all();
                }
            }
            Event::Fold => self.tree.toggle_fold(node),
            Event::FoldParent => {
                let target = self.tree.parent(node).unwrap_or(node);
                self.tree.toggle_fold(target);
                self.move_to(Some(target));
            }
            Event::Help => self.mode = Mode::HelpOverlay,
            Event::Confirm => self.confirm(),
            Event::Abort => self.mode = Mode::Done(Outcome::Aborted),
            Event::Yes | Event::Other | Event::None | Event::Resize { .. } => {}
        }
        self.scroll_to_cursor();
    }

    fn confirm(&mut self) {
        if self.tree.overall() != Aggregate::None {
            self.mode = Mode::Done(Outcome::Confirmed);
        } else if self.options.confirm_empty {
            self.mode = Mode::ConfirmExit;
        } else {
            self.message = Some("Nothing selected".to_string());
        }
    }

    fn file_of(&self, mut node: NodeId) -> NodeId {
        while let Some(parent) = self.tree.parent(node) {
            node = parent;
        }
        node
    }

    fn sibling(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let siblings = self.tree.siblings(node);
        let at = siblings.iter().position(|&id| id == node)?;
        at.checked_add_signed(offset)
            .and_then(|i| siblings.get(i))
            .copied()
    }

    fn selectable(&self) -> Vec<NodeId> {
        self.rows().into_iter().filter_map(Row::node).collect()
    }

    fn step(&mut self, offset: isize) {
        let nodes = self.selectable();
        let target = nodes
            .iter()
            .position(|&id| id == self.cursor.node)
            .and_then(|at| at.checked_add_signed(offset))
            .and_then(|i| nodes.get(i))
            .copied();
        self.move_to(target);
    }

    fn move_to(&mut self, node: Option<NodeId>) {
        if let Some(node) = node {
            self.cursor.node = node;
        }
    }

    /// Keep the cursor on a visible row, `SCROLL_MARGIN` rows from the edge
    /// where the tree allows.
    fn scroll_to_cursor(&mut self) {
        let rows = self.rows();
        let mut at = rows.iter().position(|row| row.node() == Some(self.cursor.node));
        while at.is_none() {
            let Some(parent) = self.tree.parent(self.cursor.node) else {
                break;
            };
            self.cursor.node = parent;
            at = rows.iter().position(|row| row.node() == Some(parent));
        }
        let at = at.unwrap_or(0);

        let margin = SCROLL_MARGIN.min(self.height.saturating_sub(1) / 2);
        let max_scroll = rows.len().saturating_sub(self.height);
        let mut scroll = self.cursor.scroll;
        if at < scroll + margin {
            scroll = at.saturating_sub(margin);
        } else if at + margin >= scroll + self.height {
            scroll = at + margin + 1 - self.height;
        }
        self.cursor.scroll = scroll.min(max_scroll);
    }
}
