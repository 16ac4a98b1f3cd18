//! Delays used by the tagging state machine.
//!
//! All values are milliseconds so they read naturally in `config.json`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Between simulated keystrokes.
    pub keystroke_ms: u64,
    /// After the last keystroke, before looking for the dropdown.
    pub dropdown_settle_ms: u64,
    /// Before the second dropdown attempt.
    pub dropdown_retry_ms: u64,
    /// After a candidate was committed.
    pub selection_settle_ms: u64,
    /// After the retry branch finishes, selected or not.
    pub retry_settle_ms: u64,
    /// Between setting a `data-target` value and blurring it.
    pub target_blur_ms: u64,
    /// Before the first verification read.
    pub verify_initial_ms: u64,
    /// Waits before each subsequent verification read.
    pub verify_rechecks_ms: Vec<u64>,
    /// After each processed day.
    pub inter_day_ms: u64,
    /// When no input could be found for a day.
    pub input_retry_ms: u64,
    /// After a per-day error.
    pub error_backoff_ms: u64,
    /// From controller start to the on-load pass.
    pub load_grace_ms: u64,
    /// Quiet period after the last DOM mutation.
    pub mutation_debounce_ms: u64,
    /// How often the mutation counter is read.
    pub mutation_poll_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            keystroke_ms: 50,
            dropdown_settle_ms: 1000,
            dropdown_retry_ms: 800,
            selection_settle_ms: 800,
            retry_settle_ms: 500,
            target_blur_ms: 100,
            verify_initial_ms: 3000,
            verify_rechecks_ms: vec![2000, 1500],
            inter_day_ms: 1500,
            input_retry_ms: 500,
            error_backoff_ms: 500,
            load_grace_ms: 2000,
            mutation_debounce_ms: 1000,
            mutation_poll_ms: 250,
        }
    }
}

impl Timings {
    pub fn keystroke(&self) -> Duration {
        Duration::from_millis(self.keystroke_ms)
    }

    pub fn dropdown_settle(&self) -> Duration {
        Duration::from_millis(self.dropdown_settle_ms)
    }

    pub fn dropdown_retry(&self) -> Duration {
        Duration::from_millis(self.dropdown_retry_ms)
    }

    pub fn selection_settle(&self) -> Duration {
        Duration::from_millis(self.selection_settle_ms)
    }

    pub fn retry_settle(&self) -> Duration {
        Duration::from_millis(self.retry_settle_ms)
    }

    pub fn target_blur(&self) -> Duration {
        Duration::from_millis(self.target_blur_ms)
    }

    pub fn verify_initial(&self) -> Duration {
        Duration::from_millis(self.verify_initial_ms)
    }

    pub fn verify_rechecks(&self) -> impl Iterator<Item = Duration> + '_ {
        self.verify_rechecks_ms.iter().map(|ms| Duration::from_millis(*ms))
    }

    pub fn inter_day(&self) -> Duration {
        Duration::from_millis(self.inter_day_ms)
    }

    pub fn input_retry(&self) -> Duration {
        Duration::from_millis(self.input_retry_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn load_grace(&self) -> Duration {
        Duration::from_millis(self.load_grace_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn mutation_poll(&self) -> Duration {
        Duration::from_millis(self.mutation_poll_ms.max(1))
    }
}
