#![forbid(unsafe_code)]

//! Flow configuration.
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QFLOW_BUFFER_SIZE` | [`FlowConfig::buffer_size`] |
//! | `QFLOW_VERIFY_CEILING_MS` | [`VerificationTimings::ceiling`] |
//! | `QFLOW_TERMINAL_CEILING_MS` | [`VerificationTimings::terminal_ceiling`] |
//! | `QFLOW_PERSIST_DEBOUNCE_MS` | [`FlowConfig::persist_debounce`] |
//! | `QFLOW_COMPLETION_RECHECK_MS` | [`FlowConfig::completion_recheck_delay`] |
//!
//! Unparseable values are ignored with a warning.

use std::env;
use std::time::Duration;

/// Offsets of the staged visibility checks, measured from activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationTimings {
    /// First check.
    pub immediate: Duration,
    /// Second check.
    pub short: Duration,
    /// Third check; a failure here triggers the corrective re-style.
    pub standard: Duration,
    /// Final check for every item except the last.
    pub ceiling: Duration,
    /// Final check for the last item.
    pub terminal_ceiling: Duration,
}

impl Default for VerificationTimings {
    fn default() -> Self {
        Self {
            immediate: Duration::from_millis(1),
            short: Duration::from_millis(25),
            standard: Duration::from_millis(75),
            ceiling: Duration::from_millis(200),
            terminal_ceiling: Duration::from_millis(2000),
        }
    }
}

impl VerificationTimings {
    /// The final-check offset for an item.
    #[must_use]
    pub fn ceiling_for(&self, terminal: bool) -> Duration {
        if terminal {
            self.terminal_ceiling
        } else {
            self.ceiling
        }
    }
}

/// Configuration for a [`QuestionFlow`](crate::QuestionFlow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Items materialized on either side of the current one.
    pub buffer_size: usize,
    /// Visibility check offsets.
    pub verification: VerificationTimings,
    /// Trailing-edge debounce window for persistence.
    pub persist_debounce: Duration,
    /// Delay of the completion re-check when completion happens off the last item.
    pub completion_recheck_delay: Duration,
    /// Delay before a freshly materialized slot is probed for content.
    pub content_probe_delay: Duration,
    /// Diagnostics kept before the oldest are dropped.
    pub max_diagnostics: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            verification: VerificationTimings::default(),
            persist_debounce: Duration::from_millis(500),
            completion_recheck_delay: Duration::from_millis(500),
            content_probe_delay: Duration::from_millis(100),
            max_diagnostics: 256,
        }
    }
}

impl FlowConfig {
    /// Defaults overridden by `QFLOW_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring invalid configuration value");
                    None
                }
            }
        };

        if let Some(v) = number("QFLOW_BUFFER_SIZE") {
            config.buffer_size = v as usize;
        }
        if let Some(v) = number("QFLOW_VERIFY_CEILING_MS") {
            config.verification.ceiling = Duration::from_millis(v);
        }
        if let Some(v) = number("QFLOW_TERMINAL_CEILING_MS") {
            config.verification.terminal_ceiling = Duration::from_millis(v);
        }
        if let Some(v) = number("QFLOW_PERSIST_DEBOUNCE_MS") {
            config.persist_debounce = Duration::from_millis(v);
        }
        if let Some(v) = number("QFLOW_COMPLETION_RECHECK_MS") {
            config.completion_recheck_delay = Duration::from_millis(v);
        }
        config
    }

    /// Set the window buffer.
    #[must_use]
    pub fn buffer_size(mut self, buffer: usize) -> Self {
        self.buffer_size = buffer;
        self
    }

    /// Set the visibility check offsets.
    #[must_use]
    pub fn verification(mut self, timings: VerificationTimings) -> Self {
        self.verification = timings;
        self
    }

    /// Set the persistence debounce window.
    #[must_use]
    pub fn persist_debounce(mut self, window: Duration) -> Self {
        self.persist_debounce = window;
        self
    }

    /// Set the completion re-check delay.
    #[must_use]
    pub fn completion_recheck_delay(mut self, delay: Duration) -> Self {
        self.completion_recheck_delay = delay;
        self
    }

    /// Set the content probe delay.
    #[must_use]
    pub fn content_probe_delay(mut self, delay: Duration) -> Self {
        self.content_probe_delay = delay;
        self
    }

    /// Set the diagnostics capacity.
    #[must_use]
    pub fn max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.buffer_size, 1);
        assert_eq!(config.verification.ceiling_for(false), Duration::from_millis(200));
        assert_eq!(config.verification.ceiling_for(true), Duration::from_millis(2000));
        assert_eq!(config.persist_debounce, Duration::from_millis(500));
        assert_eq!(config.max_diagnostics, 256);
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("QFLOW_BUFFER_SIZE", "2"),
            ("QFLOW_TERMINAL_CEILING_MS", "3000"),
            ("QFLOW_PERSIST_DEBOUNCE_MS", "soon"),
        ]
        .into_iter()
        .collect();
        let config = FlowConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.buffer_size, 2);
        assert_eq!(config.verification.terminal_ceiling, Duration::from_millis(3000));
        assert_eq!(config.persist_debounce, Duration::from_millis(500));
    }

    #[test]
    fn builder_setters_chain() {
        let config = FlowConfig::default()
            .buffer_size(0)
            .persist_debounce(Duration::from_millis(10))
            .max_diagnostics(4);
        assert_eq!(config.buffer_size, 0);
        assert_eq!(config.persist_debounce, Duration::from_millis(10));
        assert_eq!(config.max_diagnostics, 4);
    }
}
