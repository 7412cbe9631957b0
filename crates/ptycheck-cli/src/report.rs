//! Streaming PASS/FAIL/SKIP lines and the closing summary.

use ptycheck::suite::{SuiteObserver, SuiteReport};
use ptycheck::verdict::{TestOutcome, TestStatus};
use ptycheck::{HarnessError, HarnessResult};
use std::io::Write;

/// Prints each result as soon as its test finishes.
pub struct StreamingReporter {
    color: bool,
}

impl StreamingReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn tag(&self, status: TestStatus) -> String {
        let tag = format!("[{}]", status.tag());
        if !self.color {
            return tag;
        }
        let code = match status {
            TestStatus::Passed => "32",
            TestStatus::Failed => "31",
            TestStatus::Skipped => "33",
        };
        format!("\x1b[{code}m{tag}\x1b[0m")
    }

    pub fn print_summary(&self, report: &SuiteReport) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "SUMMARY: {}", report.suite);
        let _ = writeln!(out, "{}", "=".repeat(50));
        for entry in &report.summary.results {
            let _ = writeln!(out, "  {} {}", self.tag(entry.status), entry.name);
        }
        if let Some(err) = &report.capability_error {
            let _ = writeln!(out, "  scenarios skipped: {} {}", err.code, err.message);
        }
        if report.interrupted {
            let _ = writeln!(out, "  run interrupted");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", total_line(report));
        let _ = out.flush();
    }
}

impl SuiteObserver for StreamingReporter {
    fn on_test_finished(&self, name: &str, outcome: &TestOutcome) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{} {name}", self.tag(outcome.status));
        if outcome.status != TestStatus::Passed && !outcome.detail.is_empty() {
            let _ = writeln!(out, "       {}", outcome.detail);
        }
        let _ = out.flush();
    }
}

/// `Total: P passed, F failed, S skipped out of N`.
pub fn total_line(report: &SuiteReport) -> String {
    let summary = &report.summary;
    format!(
        "Total: {} passed, {} failed, {} skipped out of {}",
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.total()
    )
}

pub fn print_json(report: &SuiteReport) -> HarnessResult<()> {
    let payload = serde_json::to_string_pretty(report)
        .map_err(|err| HarnessError::internal(format!("failed to serialize report: {err}")))?;
    println!("{payload}");
    Ok(())
}
