#![forbid(unsafe_code)]

//! qflow demo binary entry point.

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossterm::event::{self, Event};
use qflow::{FileStore, FlowConfig, JsonSource, MemoryStore, PersistenceStore};
use qflow_demo::app::{DemoApp, action_for};
use qflow_demo::cli::Opts;
use qflow_demo::sample::sample_source;
use qflow_demo::terminal::TerminalGuard;
use tracing_subscriber::EnvFilter;

/// Install a file logger when `QFLOW_LOG` names a file. The terminal is in
/// raw mode, so nothing is logged to it.
fn init_logging() {
    let Some(path) = std::env::var_os("QFLOW_LOG") else {
        return;
    };
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("cannot open log file {}: {e}", path.to_string_lossy());
            return;
        }
    };
    let filter =
        EnvFilter::try_from_env("QFLOW_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn run_loop(app: &mut DemoApp, term: &mut TerminalGuard, exit_on_complete: bool) -> qflow::Result<()> {
    let mut last = Instant::now();
    loop {
        term.draw(&app.screen_lines())?;
        if exit_on_complete && app.is_completed() {
            return Ok(());
        }
        if event::poll(app.wait_hint())?
            && let Event::Key(key) = event::read()?
            && let Some(action) = action_for(key)
            && !app.apply(action)
        {
            return Ok(());
        }
        let now = Instant::now();
        app.tick(now.duration_since(last));
        last = now;
    }
}

fn run(opts: Opts) -> qflow::Result<()> {
    let store: Arc<dyn PersistenceStore> = if opts.no_persist {
        Arc::new(MemoryStore::new())
    } else {
        let file = match &opts.state {
            Some(path) => FileStore::new(path),
            None => FileStore::default_for_app("qflow-demo"),
        };
        Arc::new(file)
    };
    if opts.reset {
        store.clear()?;
    }

    let source = match &opts.items {
        Some(path) => JsonSource::from_path(path),
        None => sample_source(),
    };
    let mut app = DemoApp::new(source, store, FlowConfig::from_env());

    let outcome = {
        let mut term = TerminalGuard::enter()?;
        run_loop(&mut app, &mut term, opts.exit_on_complete)
    };
    let summary = app.finish();

    match summary.completed_with {
        Some(count) => println!("Flow complete: {count} answers recorded."),
        None => println!("Answered {} of {} questions.", summary.answered, summary.total),
    }
    for line in &summary.diagnostics {
        println!("  note: {line}");
    }
    outcome
}

fn main() {
    let opts = Opts::parse();
    init_logging();
    if let Err(e) = run(opts) {
        eprintln!("qflow-demo: {e}");
        std::process::exit(1);
    }
}
