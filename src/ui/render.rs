use super::controller::{Controller, Mode, Row};
use crate::diff::LineKind;
use crate::select::{Aggregate, Fold, NodeId, NodeKind, SelectionTree};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

/// Key bindings shown in the help overlay
const HELP: &[(&str, &str)] = &[
    ("k / Up", "previous item"),
    ("j / Down", "next item"),
    ("K / PgUp", "previous item on the same level"),
    ("J / PgDn", "next item on the same level"),
    ("l / Right", "unfold and enter item"),
    ("h / Left", "fold item, or go to parent"),
    ("H / S-Left", "go to file (fold it when there)"),
    ("g / G", "first / last item"),
    ("space", "toggle item"),
    ("A", "toggle all"),
    ("f", "fold / unfold item"),
    ("F", "fold parent item"),
    ("c / Enter", "confirm selection"),
    ("q / Esc", "abort without changes"),
    ("?", "this help"),
];

fn added() -> Style {
    Style::default().fg(Color::Green)
}

fn removed() -> Style {
    Style::default().fg(Color::Red)
}

fn hunk_header() -> Style {
    Style::default().fg(Color::Cyan)
}

fn file_header() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn cursor() -> Style {
    Style::default().add_modifier(Modifier::REVERSED)
}

fn status() -> Style {
    Style::default().fg(Color::Black).bg(Color::Gray)
}

/// Render the whole screen for the controller's current state.
pub fn draw(f: &mut Frame, controller: &Controller) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    render_status(f, chunks[0], controller);
    render_tree(f, chunks[1], controller);

    match controller.mode() {
        Mode::HelpOverlay => render_help(f, area),
        Mode::ConfirmExit => render_confirm(f, area),
        Mode::Browsing | Mode::Done(_) => {}
    }
}

fn render_status(f: &mut Frame, area: Rect, controller: &Controller) {
    let (selected, total) = controller.tree().selected_count();
    let mut text = format!(" {selected}/{total} selected | space: toggle  c: confirm  q: abort  ?: help");
    if let Some(message) = controller.message() {
        text.push_str(" | ");
        text.push_str(message);
    }
    f.render_widget(Paragraph::new(text).style(status()), area);
}

fn render_tree(f: &mut Frame, area: Rect, controller: &Controller) {
    let tree = controller.tree();
    let (rows, at) = controller.visible_rows();
    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .map(|(i, &row)| {
            let line = row_line(tree, row);
            if Some(i) == at { line.style(cursor()) } else { line }
        })
        .collect();
    f.render_widget(Paragraph::new(lines), area);
}

fn check(aggregate: Aggregate) -> &'static str {
    match aggregate {
        Aggregate::All => "[x]",
        Aggregate::Partial => "[~]",
        Aggregate::None => "[ ]",
    }
}

fn fold(tree: &SelectionTree, id: NodeId) -> &'static str {
    match tree.fold(id) {
        _ if tree.children(id).is_empty() => " ",
        Fold::Expanded => "▾",
        Fold::Collapsed => "▸",
    }
}

/// Tabs and carriage returns would break the grid.
fn printable(text: &str) -> String {
    text.replace('\t', "    ").replace('\r', "")
}

fn row_line(tree: &SelectionTree, row: Row) -> Line<'static> {
    let files = &tree.patch().files;
    match row {
        Row::File(id) => {
            let NodeKind::File { file } = tree.kind(id) else {
                return Line::default();
            };
            let Some(diff) = files.get(file) else {
                return Line::default();
            };
            let mut text = format!(
                "{} {} {} {}",
                fold(tree, id),
                check(tree.aggregate(id)),
                diff.header.change.letter(),
                diff.path()
            );
            if let (Some(old), Some(new)) = (&diff.header.old_path, &diff.header.new_path)
                && old != new
            {
                text = format!("{text} (from {old})");
            }
            if diff.is_binary() {
                text.push_str(" (binary)");
            } else if diff.is_atomic() {
                text.push_str(" (whole file)");
            }
            Line::from(Span::styled(text, file_header()))
        }
        Row::Hunk(id) => {
            let NodeKind::Hunk { file, hunk } = tree.kind(id) else {
                return Line::default();
            };
            let header = files
                .get(file)
                .and_then(|f| f.hunks.get(hunk))
                .map(|h| h.header.to_string())
                .unwrap_or_default();
            Line::from(vec![
                Span::raw(format!("  {} {} ", fold(tree, id), check(tree.aggregate(id)))),
                Span::styled(printable(&header), hunk_header()),
            ])
        }
        Row::Context { file, hunk, line } => {
            let text = files
                .get(file)
                .and_then(|f| f.hunks.get(hunk))
                .and_then(|h| h.lines.get(line))
                .map(|l| printable(&l.text))
                .unwrap_or_default();
            Line::from(format!("          {text}"))
        }
        Row::Line(id) => {
            let NodeKind::Line { file, hunk, line } = tree.kind(id) else {
                return Line::default();
            };
            let Some(diff_line) = files
                .get(file)
                .and_then(|f| f.hunks.get(hunk))
                .and_then(|h| h.lines.get(line))
            else {
                return Line::default();
            };
            let style = match diff_line.kind {
                LineKind::Added => added(),
                LineKind::Removed => removed(),
                LineKind::Context => Style::default(),
            };
            Line::from(vec![
                Span::raw(format!("      {} ", check(tree.aggregate(id)))),
                Span::styled(
                    format!("{}{}", diff_line.kind.prefix(), printable(&diff_line.text)),
                    style,
                ),
            ])
        }
    }
}

fn render_help(f: &mut Frame, area: Rect) {
    let height = (HELP.len() as u16 + 4).min(area.height);
    let width = 56u16.min(area.width);
    let popup = centered_rect(width, height, area);

    f.render_widget(Clear, popup);

    let mut lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| Line::from(format!(" {keys:<12} {what}")))
        .collect();
    lines.push(Line::default());
    lines.push(Line::from(" press any key to close"));

    let block = Block::default().title(" Help ").borders(Borders::ALL);
    f.render_widget(Paragraph::new(lines).block(block), popup);
}

fn render_confirm(f: &mut Frame, area: Rect) {
    let popup = centered_rect(48u16.min(area.width), 4u16.min(area.height), area);

    f.render_widget(Clear, popup);

    let block = Block::default().title(" Nothing selected ").borders(Borders::ALL);
    let text = vec![
        Line::from(" Leave without staging anything?"),
        Line::from(" y: leave   any other key: go back"),
    ];
    f.render_widget(Paragraph::new(text).block(block), popup);
}

/// Calculate a centered rectangle within an area
fn centered_rect(width: u16, height: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(r.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(r.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(vertical[1])[1]
}
