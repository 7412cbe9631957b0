//! Verbose scenario progress using indicatif.

use indicatif::{ProgressBar, ProgressStyle};
use ptycheck::scenario::{ProgressCallback, ProgressEvent, StepStatus};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Spinner per step, then a status line and the step's screen evidence on stderr.
pub struct VerboseProgress {
    color: bool,
    spinner: Mutex<Option<ProgressBar>>,
    total_steps: Mutex<usize>,
}

impl VerboseProgress {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            spinner: Mutex::new(None),
            total_steps: Mutex::new(0),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn start_spinner(&self, step_index: usize, label: &str) {
        let total = self.total_steps.lock().map(|guard| *guard).unwrap_or(0);
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("[{step_index}/{total}] {label}"));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut spinner) = self.spinner.lock() {
            *spinner = Some(pb);
        }
    }

    fn clear_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressCallback for VerboseProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let mut stderr = std::io::stderr();
        match event {
            ProgressEvent::ScenarioStarted { name, total_steps } => {
                if let Ok(mut total) = self.total_steps.lock() {
                    *total = *total_steps;
                }
                let _ = writeln!(stderr, "scenario started: {name} ({total_steps} steps)");
            }
            ProgressEvent::StepStarted { step_index, label } => {
                self.start_spinner(*step_index, label);
            }
            ProgressEvent::StepCompleted {
                label,
                status,
                duration_ms,
                screen,
                ..
            } => {
                self.clear_spinner();
                let icon = match status {
                    StepStatus::Passed => self.paint("32", "✓"),
                    StepStatus::Failed => self.paint("31", "✗"),
                    StepStatus::Skipped => self.paint("33", "-"),
                };
                let _ = writeln!(stderr, "  {icon} {label} ({duration_ms}ms)");
                for line in screen {
                    let _ = writeln!(stderr, "      | {line}");
                }
            }
            ProgressEvent::ScenarioCompleted {
                name,
                passed,
                duration_ms,
            } => {
                self.clear_spinner();
                let verdict = if *passed {
                    self.paint("32", "passed")
                } else {
                    self.paint("31", "failed")
                };
                let _ = writeln!(stderr, "scenario {name} {verdict}: {duration_ms}ms total");
            }
        }
    }
}
