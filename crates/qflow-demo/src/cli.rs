#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually and honors `QFLOW_DEMO_*` environment overrides.

use std::env;
use std::path::PathBuf;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
qflow demo: a windowed, verified question flow in the terminal

USAGE:
    qflow-demo [OPTIONS] [ITEMS.json]

OPTIONS:
    --state=PATH         Answers file (default: $XDG_STATE_HOME/qflow/qflow-demo/answers.json)
    --no-persist         Keep answers in memory only
    --reset              Discard saved answers before starting
    --exit-on-complete   Quit as soon as the flow completes
    --help, -h           Show this help message
    --version, -V        Show version

KEYBINDINGS:
    Right / Enter   Next question (once answered)
    Left            Previous question
    a-d             Pick an answer (inner answer for scenarios)
    A-D             Pick the outer answer for scenarios
    r               Reset all answers
    q / Esc         Quit

ENVIRONMENT VARIABLES:
    QFLOW_DEMO_ITEMS          Items file when none is given
    QFLOW_DEMO_STATE          Override --state
    QFLOW_LOG                 Write logs to this file
    QFLOW_LOG_LEVEL           Log filter (default: info)";

/// Parsed command-line options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    /// Items file; the built-in sample when absent.
    pub items: Option<PathBuf>,
    /// Answers file override.
    pub state: Option<PathBuf>,
    /// Keep answers in memory only.
    pub no_persist: bool,
    /// Clear saved answers first.
    pub reset: bool,
    /// Quit when the flow completes.
    pub exit_on_complete: bool,
}

/// What argument parsing decided.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    /// Run with these options.
    Run(Opts),
    /// Print this and exit successfully.
    Print(String),
    /// Print this and exit with failure.
    Fail(String),
}

impl Opts {
    /// Parse process arguments and environment, exiting on `--help`,
    /// `--version`, or a bad argument.
    pub fn parse() -> Self {
        let args: Vec<String> = env::args().skip(1).collect();
        match Self::parse_from(&args, |key| env::var(key).ok()) {
            Parsed::Run(opts) => opts,
            Parsed::Print(text) => {
                println!("{text}");
                process::exit(0);
            }
            Parsed::Fail(msg) => {
                eprintln!("{msg}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    /// Parse `args` with `lookup` for environment variables. Flags override
    /// the environment.
    pub fn parse_from(args: &[String], lookup: impl Fn(&str) -> Option<String>) -> Parsed {
        let mut opts = Self {
            items: lookup("QFLOW_DEMO_ITEMS").map(PathBuf::from),
            state: lookup("QFLOW_DEMO_STATE").map(PathBuf::from),
            ..Self::default()
        };

        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => return Parsed::Print(HELP_TEXT.to_string()),
                "--version" | "-V" => return Parsed::Print(format!("qflow-demo {VERSION}")),
                "--no-persist" => opts.no_persist = true,
                "--reset" => opts.reset = true,
                "--exit-on-complete" => opts.exit_on_complete = true,
                other => {
                    if let Some(val) = other.strip_prefix("--state=") {
                        if val.is_empty() {
                            return Parsed::Fail("Empty --state value".into());
                        }
                        opts.state = Some(PathBuf::from(val));
                    } else if other.starts_with('-') {
                        return Parsed::Fail(format!("Unknown argument: {other}"));
                    } else {
                        opts.items = Some(PathBuf::from(other));
                    }
                }
            }
        }
        Parsed::Run(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_use_sample_and_persist() {
        assert_eq!(Opts::parse_from(&[], |_| None), Parsed::Run(Opts::default()));
    }

    #[test]
    fn flags_and_positional_items() {
        let parsed = Opts::parse_from(
            &args(&["--no-persist", "--exit-on-complete", "items.json"]),
            |_| None,
        );
        let Parsed::Run(opts) = parsed else {
            panic!("expected run");
        };
        assert!(opts.no_persist);
        assert!(opts.exit_on_complete);
        assert_eq!(opts.items, Some(PathBuf::from("items.json")));
    }

    #[test]
    fn flag_overrides_environment() {
        let env = |key: &str| (key == "QFLOW_DEMO_STATE").then(|| "/tmp/env.json".to_string());
        let Parsed::Run(opts) = Opts::parse_from(&[], env) else {
            panic!("expected run");
        };
        assert_eq!(opts.state, Some(PathBuf::from("/tmp/env.json")));

        let Parsed::Run(opts) = Opts::parse_from(&args(&["--state=/tmp/flag.json"]), env) else {
            panic!("expected run");
        };
        assert_eq!(opts.state, Some(PathBuf::from("/tmp/flag.json")));
    }

    #[test]
    fn unknown_flag_fails() {
        assert!(matches!(
            Opts::parse_from(&args(&["--frobnicate"]), |_| None),
            Parsed::Fail(_)
        ));
        assert!(matches!(
            Opts::parse_from(&args(&["-h"]), |_| None),
            Parsed::Print(text) if text.contains("KEYBINDINGS")
        ));
    }
}
