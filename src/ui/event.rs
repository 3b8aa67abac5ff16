use super::UiError;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Input the controller understands
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Nothing to act on (mouse, focus, key releases)
    None,
    /// A key with no binding
    Other,
    Up,
    Down,
    PrevSibling,
    NextSibling,
    Expand,
    Collapse,
    FileHeader,
    First,
    Last,
    Toggle,
    ToggleAll,
    Fold,
    FoldParent,
    Help,
    Confirm,
    Abort,
    Yes,
    Resize { width: u16, height: u16 },
}

impl From<crossterm::event::Event> for Event {
    fn from(event: crossterm::event::Event) -> Self {
        use crossterm::event::Event;
        match event {
            Event::Resize(width, height) => Self::Resize { width, height },
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                state: _,
            }) => key(code, modifiers),
            _event => Self::None,
        }
    }
}

fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Event::Abort,
            _ => Event::Other,
        };
    }
    match code {
        KeyCode::Char('k') | KeyCode::Up => Event::Up,
        KeyCode::Char('j') | KeyCode::Down => Event::Down,
        KeyCode::Char('K') | KeyCode::PageUp => Event::PrevSibling,
        KeyCode::Char('J') | KeyCode::PageDown => Event::NextSibling,
        KeyCode::Char('l') | KeyCode::Right => Event::Expand,
        KeyCode::Left if modifiers.contains(KeyModifiers::SHIFT) => Event::FileHeader,
        KeyCode::Char('h') | KeyCode::Left => Event::Collapse,
        KeyCode::Char('H') => Event::FileHeader,
        KeyCode::Char('g') | KeyCode::Home => Event::First,
        KeyCode::Char('G') | KeyCode::End => Event::Last,
        KeyCode::Char(' ') => Event::Toggle,
        KeyCode::Char('A') => Event::ToggleAll,
        KeyCode::Char('f') => Event::Fold,
        KeyCode::Char('F') => Event::FoldParent,
        KeyCode::Char('?') => Event::Help,
        KeyCode::Char('c') | KeyCode::Enter => Event::Confirm,
        KeyCode::Char('q') | KeyCode::Esc => Event::Abort,
        KeyCode::Char('y') | KeyCode::Char('Y') => Event::Yes,
        _ => Event::Other,
    }
}

/// The source to read user events from.
pub enum EventSource {
    /// Read from the terminal with `crossterm`.
    Crossterm,

    /// Read from the provided sequence of events.
    Testing {
        /// The width of the virtual terminal in columns.
        width: u16,

        /// The height of the virtual terminal in rows.
        height: u16,

        /// The sequence of events to emit; an exhausted script aborts.
        events: Box<dyn Iterator<Item = Event>>,
    },
}

impl EventSource {
    /// Helper function to construct an `EventSource::Testing`.
    pub fn testing(width: u16, height: u16, events: impl IntoIterator<Item = Event> + 'static) -> Self {
        Self::Testing {
            width,
            height,
            events: Box::new(events.into_iter()),
        }
    }

    pub(crate) fn next_event(&mut self) -> Result<Event, UiError> {
        match self {
            EventSource::Crossterm => {
                let event = crossterm::event::read().map_err(|e| UiError::ReadInput {
                    message: e.to_string(),
                })?;
                Ok(event.into())
            }
            EventSource::Testing { events, .. } => Ok(events.next().unwrap_or(Event::Abort)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use similar_asserts::assert_eq;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Event {
        crossterm::event::Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
        .into()
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(press(KeyCode::Char('j'), KeyModifiers::NONE), Event::Down);
        assert_eq!(press(KeyCode::Up, KeyModifiers::NONE), Event::Up);
        assert_eq!(press(KeyCode::Char('J'), KeyModifiers::SHIFT), Event::NextSibling);
        assert_eq!(press(KeyCode::PageUp, KeyModifiers::NONE), Event::PrevSibling);
        assert_eq!(press(KeyCode::Left, KeyModifiers::SHIFT), Event::FileHeader);
        assert_eq!(press(KeyCode::Left, KeyModifiers::NONE), Event::Collapse);
        assert_eq!(press(KeyCode::End, KeyModifiers::NONE), Event::Last);
    }

    #[test]
    fn action_keys() {
        assert_eq!(press(KeyCode::Char(' '), KeyModifiers::NONE), Event::Toggle);
        assert_eq!(press(KeyCode::Char('A'), KeyModifiers::SHIFT), Event::ToggleAll);
        assert_eq!(press(KeyCode::Enter, KeyModifiers::NONE), Event::Confirm);
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::CONTROL), Event::Abort);
        assert_eq!(press(KeyCode::Esc, KeyModifiers::NONE), Event::Abort);
        assert_eq!(press(KeyCode::Char('x'), KeyModifiers::NONE), Event::Other);
    }

    #[test]
    fn releases_and_resizes() {
        let release = crossterm::event::Event::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(Event::from(release), Event::None);
        assert_eq!(
            Event::from(crossterm::event::Event::Resize(100, 40)),
            Event::Resize { width: 100, height: 40 }
        );
    }

    #[test]
    fn exhausted_script_aborts() {
        let mut source = EventSource::testing(80, 24, [Event::Down]);
        assert_eq!(source.next_event().ok(), Some(Event::Down));
        assert_eq!(source.next_event().ok(), Some(Event::Abort));
    }
}
