#![forbid(unsafe_code)]

//! Demo state: the question flow plus key handling and screen text.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use qflow::{
    AnswerRecord, FlowBuilder, FlowConfig, NavCommand, PersistenceStore, QuestionFlow,
    QuestionSource, VerificationPhase,
};

use crate::render::{ItemOptions, OPTION_KEYS, TextFactory};

/// Longest the host waits for input before advancing the flow clock.
const MAX_WAIT: Duration = Duration::from_millis(250);

/// A user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Navigate.
    Navigate(NavCommand),
    /// Pick option `index`; `outer` picks the outer half of a scenario.
    Pick {
        /// Option position.
        index: usize,
        /// Outer half.
        outer: bool,
    },
    /// Clear every answer.
    Reset,
    /// Leave the demo.
    Quit,
}

/// Map a key press to an action.
#[must_use]
pub fn action_for(key: KeyEvent) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Right | KeyCode::Enter => Some(Action::Navigate(NavCommand::Next)),
        KeyCode::Left => Some(Action::Navigate(NavCommand::Previous)),
        KeyCode::Esc | KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('r') => Some(Action::Reset),
        KeyCode::Char(c) => {
            let lower = c.to_ascii_lowercase();
            OPTION_KEYS.iter().position(|k| *k == lower).map(|index| Action::Pick {
                index,
                outer: c.is_ascii_uppercase(),
            })
        }
        _ => None,
    }
}

/// What the demo reports after the terminal is restored.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Records delivered by the completion callback, if it fired.
    pub completed_with: Option<usize>,
    /// Items answered at exit.
    pub answered: usize,
    /// Items in the flow.
    pub total: usize,
    /// Diagnostics recorded during the session.
    pub diagnostics: Vec<String>,
}

/// The running demo.
pub struct DemoApp {
    flow: QuestionFlow<TextFactory>,
    completed: Rc<RefCell<Option<usize>>>,
    progress: Rc<Cell<f64>>,
}

impl DemoApp {
    /// Build and start the flow.
    pub fn new<S: QuestionSource>(source: S, store: Arc<dyn PersistenceStore>, config: FlowConfig) -> Self {
        let completed = Rc::new(RefCell::new(None));
        let progress = Rc::new(Cell::new(0.0));
        let on_complete = completed.clone();
        let on_progress = progress.clone();

        let mut flow = FlowBuilder::new(source, TextFactory)
            .persistence(store)
            .config(config)
            .on_progress(move |p: f64| on_progress.set(p))
            .on_complete(move |records: &[AnswerRecord]| {
                *on_complete.borrow_mut() = Some(records.len());
            })
            .build();
        flow.start();
        Self {
            flow,
            completed,
            progress,
        }
    }

    /// Apply an action. Returns false when the demo should quit.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::Navigate(command) => {
                self.flow.handle_command(command);
            }
            Action::Pick { index, outer } => {
                let value = self.flow.current_item().and_then(|item| {
                    ItemOptions::from_item(item).value_for(item.kind, index, outer)
                });
                if let Some(value) = value {
                    self.flow.select_current(value);
                }
            }
            Action::Reset => self.flow.reset(),
            Action::Quit => return false,
        }
        true
    }

    /// Advance the flow clock by real elapsed time.
    pub fn tick(&mut self, elapsed: Duration) {
        self.flow.advance_time(elapsed);
    }

    /// How long to wait for input before the next tick.
    #[must_use]
    pub fn wait_hint(&self) -> Duration {
        self.flow
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(self.flow.now()))
            .map_or(MAX_WAIT, |d| d.min(MAX_WAIT))
    }

    /// Whether the completion callback has fired.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.borrow().is_some()
    }

    /// The flow.
    #[must_use]
    pub fn flow(&self) -> &QuestionFlow<TextFactory> {
        &self.flow
    }

    /// Screen text, top to bottom.
    #[must_use]
    pub fn screen_lines(&self) -> Vec<String> {
        let progress = self.flow.progress();
        let mut lines = vec![
            format!(
                "qflow demo   question {}/{}   answered {:.0}%",
                progress.current_number,
                progress.total,
                self.progress.get()
            ),
            String::new(),
        ];

        if progress.total == 0 {
            lines.push("No questions could be loaded.".into());
        } else {
            lines.extend(self.flow.current_lines());
        }
        lines.push(String::new());

        let next = if self.flow.can_go_next() { "->" } else { "  " };
        let prev = if self.flow.can_go_previous() { "<-" } else { "  " };
        let status = match self.flow.verification_phase() {
            VerificationPhase::Idle => "idle",
            VerificationPhase::Staged(_) => "verifying",
            VerificationPhase::Confirmed => "shown",
            VerificationPhase::ForcedOverride => "forced",
        };
        lines.push(format!("[{prev}] [{next}]   slot: {status}   diagnostics: {}", self.flow.diagnostics().len()));
        if let Some(count) = *self.completed.borrow() {
            lines.push(format!("Complete: {count} answers saved. Press q to quit."));
        }
        lines.push("a-d answer   A-D outer answer   arrows navigate   r reset   q quit".into());
        lines
    }

    /// Stop the flow and summarize the session.
    pub fn finish(mut self) -> Summary {
        self.flow.shutdown();
        let progress = self.flow.progress();
        Summary {
            completed_with: *self.completed.borrow(),
            answered: progress.completed,
            total: progress.total,
            diagnostics: self
                .flow
                .diagnostics()
                .iter()
                .map(|entry| entry.diagnostic.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_source;
    use crossterm::event::KeyModifiers;
    use qflow::MemoryStore;

    fn app() -> (DemoApp, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (DemoApp::new(sample_source(), store.clone(), FlowConfig::default()), store)
    }

    fn press(c: char) -> Action {
        action_for(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)).unwrap()
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(press('b'), Action::Pick { index: 1, outer: false });
        assert_eq!(press('D'), Action::Pick { index: 3, outer: true });
        assert_eq!(press('q'), Action::Quit);
        assert_eq!(
            action_for(KeyEvent::new(KeyCode::Right, KeyModifiers::NONE)),
            Some(Action::Navigate(NavCommand::Next))
        );
        assert!(action_for(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE)).is_none());
    }

    #[test]
    fn picking_unlocks_next() {
        let (mut app, _) = app();
        app.tick(Duration::from_millis(5));
        assert!(!app.flow().can_go_next());
        assert!(app.apply(press('a')));
        assert!(app.flow().can_go_next());
        assert!(app.screen_lines().iter().any(|l| l.contains("* (a) Strongly agree")));
    }

    #[test]
    fn full_run_completes_and_saves() {
        let (mut app, store) = app();
        for _ in 0..24 {
            app.apply(press('b'));
            app.tick(Duration::from_millis(5));
            app.apply(Action::Navigate(NavCommand::Next));
        }
        for step in 0..6 {
            app.apply(press('c'));
            app.apply(press('A'));
            app.tick(Duration::from_millis(5));
            if step < 5 {
                app.apply(Action::Navigate(NavCommand::Next));
            }
        }
        assert!(app.is_completed());
        assert!(store.save_count() >= 1);
        assert!(app.screen_lines().iter().any(|l| l.starts_with("Complete: 30")));

        let summary = app.finish();
        assert_eq!(summary.completed_with, Some(30));
        assert_eq!(summary.answered, 30);
        assert!(summary.diagnostics.is_empty());
    }

    #[test]
    fn wait_hint_is_bounded() {
        let (app, _) = app();
        assert!(app.wait_hint() <= MAX_WAIT);
        assert_eq!(app.wait_hint(), Duration::from_millis(1));
    }

    #[test]
    fn answers_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");

        let store = Arc::new(qflow::FileStore::new(&path));
        let mut first = DemoApp::new(sample_source(), store, FlowConfig::default());
        first.apply(press('a'));
        first.tick(Duration::from_millis(600));
        first.finish();
        assert!(path.exists());

        let store = Arc::new(qflow::FileStore::new(&path));
        let mut second = DemoApp::new(sample_source(), store, FlowConfig::default());
        second.tick(Duration::from_millis(5));
        assert_eq!(second.flow().progress().completed, 1);
        assert!(second.flow().can_go_next());
    }
}
