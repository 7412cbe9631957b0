//! Progress callback for reporting scenario progress.
//!
//! This module provides a trait for receiving progress events during scenario execution.

use super::StepStatus;

/// Event emitted during scenario execution for progress tracking.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Scenario has started.
    ScenarioStarted {
        /// Scenario name.
        name: String,
        /// Total number of steps.
        total_steps: usize,
    },
    /// A step has started.
    StepStarted {
        /// Current step index (1-based).
        step_index: usize,
        /// Step label.
        label: String,
    },
    /// A step has completed.
    StepCompleted {
        /// Current step index (1-based).
        step_index: usize,
        /// Step label.
        label: String,
        /// Final status.
        status: StepStatus,
        /// Duration in milliseconds.
        duration_ms: u64,
        /// Last normalized screen lines after the step settled.
        screen: Vec<String>,
    },
    /// Scenario has completed.
    ScenarioCompleted {
        /// Scenario name.
        name: String,
        /// Whether the scenario passed.
        passed: bool,
        /// Total duration in milliseconds.
        duration_ms: u64,
    },
}

/// Trait for receiving progress events during execution.
///
/// Implementors can use this to display progress, log events, or collect metrics.
pub trait ProgressCallback: Send + Sync {
    /// Called for each progress event.
    fn on_progress(&self, event: &ProgressEvent);
}

/// A no-op progress callback that discards all events.
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// A progress callback that collects events for testing.
#[cfg(test)]
pub struct CollectingProgress {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl CollectingProgress {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .expect("progress mutex poisoned")
            .clone()
    }
}

#[cfg(test)]
impl ProgressCallback for CollectingProgress {
    #[allow(clippy::expect_used)]
    fn on_progress(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .expect("progress mutex poisoned")
            .push(event.clone());
    }
}
