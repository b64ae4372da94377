//! Per-stage bookkeeping shared between a worker and its observers.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// A unit travelling through a pipeline buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit {
    /// Position of this unit in its producing stage's output sequence.
    pub seq: u64,
}

/// Lifecycle of a stage worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Running,
    Completed,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::NotStarted,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Completion counter and state for one stage.
///
/// Only the owning worker calls [`record`](Self::record) and the state
/// transitions; anyone may read.
#[derive(Debug)]
pub struct StageCounter {
    name: String,
    quota: u64,
    completed: AtomicU64,
    state: AtomicU8,
}

impl StageCounter {
    pub fn new(name: impl Into<String>, quota: u64) -> Self {
        Self {
            name: name.into(),
            quota,
            completed: AtomicU64::new(0),
            state: AtomicU8::new(StageState::NotStarted as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Units still owed by this stage.
    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.completed())
    }

    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn start(&self) {
        self.state
            .store(StageState::Running as u8, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.state
            .store(StageState::Completed as u8, Ordering::Release);
    }

    /// Records one finished unit and returns the new total.
    pub(crate) fn record(&self) -> u64 {
        let total = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(
            total <= self.quota,
            "stage '{}' exceeded its quota of {}",
            self.name,
            self.quota
        );
        total
    }

    pub fn tally(&self) -> StageTally {
        StageTally {
            name: self.name.clone(),
            quota: self.quota,
            completed: self.completed(),
        }
    }
}

/// Final count for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTally {
    pub name: String,
    pub quota: u64,
    pub completed: u64,
}

impl StageTally {
    pub fn is_complete(&self) -> bool {
        self.completed == self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_counter_lifecycle() {
        let counter = StageCounter::new("milk", 3);
        assert_eq!(counter.name(), "milk");
        assert_eq!(counter.quota(), 3);
        assert_eq!(counter.state(), StageState::NotStarted);

        counter.start();
        assert_eq!(counter.state(), StageState::Running);

        assert_eq!(counter.record(), 1);
        assert_eq!(counter.record(), 2);
        assert_eq!(counter.remaining(), 1);
        assert_eq!(counter.record(), 3);
        assert_eq!(counter.remaining(), 0);

        counter.finish();
        assert_eq!(counter.state(), StageState::Completed);

        let tally = counter.tally();
        assert_eq!(tally.completed, 3);
        assert!(tally.is_complete());
    }

    #[test]
    fn test_stage_state_display() {
        assert_eq!(StageState::NotStarted.to_string(), "not_started");
        assert_eq!(StageState::Running.to_string(), "running");
        assert_eq!(StageState::Completed.to_string(), "completed");
    }

    #[test]
    fn test_stage_state_serialization() {
        let json = serde_json::to_string(&StageState::NotStarted).expect("serialize");
        assert_eq!(json, "\"not_started\"");
    }
}
