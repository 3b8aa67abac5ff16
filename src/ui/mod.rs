//! Terminal front end: a controller state machine, key mapping and rendering.

pub mod controller;
pub mod event;
pub mod render;

pub use controller::{Controller, Cursor, Mode, Outcome, RecordOptions, Row};
pub use event::{Event, EventSource};

use crossterm::{
    cursor::Show,
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use error_set::error_set;
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend, TestBackend},
};
use std::{io, panic};
use tracing::{debug, warn};

error_set! {
    /// Errors from driving the terminal
    UiError := {
        #[display("Failed to set up the terminal: {message}")]
        Terminal { message: String },
        #[display("Failed to read input: {message}")]
        ReadInput { message: String },
        #[display("Failed to draw: {message}")]
        Render { message: String },
    }
}

/// Run an interactive session until the user confirms or aborts.
///
/// The terminal is restored before returning, including when drawing panics.
pub fn run(controller: &mut Controller, source: &mut EventSource) -> Result<Outcome, UiError> {
    debug!("starting interactive session");
    let outcome = match *source {
        EventSource::Crossterm => run_crossterm(controller, source),
        EventSource::Testing { width, height, .. } => {
            let mut term = Terminal::new(TestBackend::new(width, height)).map_err(|e| {
                UiError::Terminal {
                    message: e.to_string(),
                }
            })?;
            run_inner(&mut term, controller, source)
        }
    }?;
    debug!(?outcome, "interactive session finished");
    Ok(outcome)
}

fn run_crossterm(controller: &mut Controller, source: &mut EventSource) -> Result<Outcome, UiError> {
    enable_raw_mode().map_err(|e| UiError::Terminal {
        message: e.to_string(),
    })?;
    if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
        cleanup_terminal();
        return Err(UiError::Terminal {
            message: e.to_string(),
        });
    }

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let mut term = Terminal::new(CrosstermBackend::new(io::stdout())).map_err(|e| {
            UiError::Terminal {
                message: e.to_string(),
            }
        })?;
        run_inner(&mut term, controller, source)
    }));

    cleanup_terminal();
    match result {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn cleanup_terminal() {
    if let Err(err) = disable_raw_mode() {
        warn!(%err, "failed to disable raw mode");
    }
    if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen, Show) {
        warn!(%err, "failed to leave the alternate screen");
    }
}

fn run_inner<B: Backend>(
    term: &mut Terminal<B>,
    controller: &mut Controller,
    source: &mut EventSource,
) -> Result<Outcome, UiError> {
    loop {
        let size = term.size().map_err(|e| UiError::Render {
            message: e.to_string(),
        })?;
        controller.set_viewport(size.width, size.height);
        term.draw(|f| render::draw(f, controller))
            .map_err(|e| UiError::Render {
                message: e.to_string(),
            })?;

        if let Mode::Done(outcome) = controller.mode() {
            return Ok(outcome);
        }
        let event = source.next_event()?;
        controller.handle(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diff::PatchSet;
    use crate::select::{Aggregate, SelectionTree};
    use similar_asserts::assert_eq;

    const SAMPLE: &str = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,2 +1,2 @@
-old
+new
 same
";

    fn session(events: Vec<Event>) -> (Outcome, Controller) {
        let tree = SelectionTree::new(PatchSet::parse(SAMPLE).unwrap());
        let mut controller = Controller::new(tree, RecordOptions::default()).unwrap();
        let mut source = EventSource::testing(80, 20, events);
        let outcome = run(&mut controller, &mut source).unwrap();
        (outcome, controller)
    }

    #[test]
    fn confirm_ends_the_session() {
        let (outcome, controller) = session(vec![Event::Confirm]);
        assert_eq!(outcome, Outcome::Confirmed);
        assert_eq!(controller.tree().overall(), Aggregate::All);
    }

    #[test]
    fn toggles_survive_into_the_tree() {
        let (outcome, controller) = session(vec![
            Event::Expand,
            Event::Down,
            Event::Toggle,
            Event::Confirm,
        ]);
        assert_eq!(outcome, Outcome::Confirmed);
        assert_eq!(controller.tree().overall(), Aggregate::Partial);
        assert_eq!(controller.tree().selected_count(), (1, 2));
    }

    #[test]
    fn exhausted_script_aborts() {
        let (outcome, _) = session(vec![Event::Down, Event::Help]);
        assert_eq!(outcome, Outcome::Aborted);
    }

    #[test]
    fn leaving_with_nothing_selected() {
        let (outcome, controller) = session(vec![Event::ToggleAll, Event::Confirm, Event::Yes]);
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(controller.tree().overall(), Aggregate::None);
    }
}
