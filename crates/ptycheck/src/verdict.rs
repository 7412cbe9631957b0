//! Named test outcomes and the suite-level verdict.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Final state of one named test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Not run, e.g. a missing capability or an interrupted suite. Not a failure.
    Skipped,
}

impl TestStatus {
    /// Reporter tag: `PASS`, `FAIL` or `SKIP`.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
            Self::Skipped => "SKIP",
        }
    }
}

/// Outcome of one test with a short detail line and optional evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub status: TestStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
}

impl TestOutcome {
    pub fn passed(detail: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Passed, detail)
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Failed, detail)
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Skipped, detail)
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    fn with_status(status: TestStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            evidence: None,
        }
    }
}

/// One entry of a [`Summary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub name: String,
    pub status: TestStatus,
}

/// Counts plus the ordered per-test statuses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<SummaryEntry>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Insertion-ordered map from test name to outcome.
///
/// Recording a name a second time replaces its outcome but keeps its original
/// position.
#[derive(Clone, Debug, Default)]
pub struct VerdictAggregator {
    entries: Vec<(String, TestOutcome)>,
}

impl VerdictAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, outcome: TestOutcome) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = outcome,
            None => self.entries.push((name, outcome)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TestOutcome> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, outcome)| outcome)
    }

    /// Recorded outcomes in first-recorded order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &TestOutcome)> {
        self.entries
            .iter()
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summarize(&self) -> Summary {
        let mut summary = Summary::default();
        for (name, outcome) in &self.entries {
            match outcome.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
            }
            summary.results.push(SummaryEntry {
                name: name.clone(),
                status: outcome.status,
            });
        }
        summary
    }

    /// 0 when nothing failed, 1 otherwise. An empty run exits 0.
    pub fn exit_code(&self) -> i32 {
        let any_failed = self
            .entries
            .iter()
            .any(|(_, outcome)| outcome.status == TestStatus::Failed);
        i32::from(any_failed)
    }

    /// Consume the aggregator, yielding `(name, outcome)` pairs in order.
    pub fn into_entries(self) -> Vec<(String, TestOutcome)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_overwrite_in_place() {
        let mut verdicts = VerdictAggregator::new();
        verdicts.record("CLI: Scan", TestOutcome::failed("first"));
        verdicts.record("TUI: Smoke", TestOutcome::passed("ok"));
        verdicts.record("CLI: Scan", TestOutcome::passed("retry"));

        let summary = verdicts.summarize();
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.results[0].name, "CLI: Scan");
        assert_eq!(summary.results[0].status, TestStatus::Passed);
        assert_eq!(verdicts.get("CLI: Scan").unwrap().detail, "retry");
        assert_eq!(verdicts.exit_code(), 0);
    }

    #[test]
    fn any_failure_sets_exit_code() {
        let mut verdicts = VerdictAggregator::new();
        verdicts.record("a", TestOutcome::passed(""));
        verdicts.record("b", TestOutcome::failed("boom"));
        verdicts.record("c", TestOutcome::skipped("no pty"));
        let summary = verdicts.summarize();
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
        assert_eq!(verdicts.exit_code(), 1);
    }

    #[test]
    fn skipped_and_empty_runs_do_not_fail() {
        let mut verdicts = VerdictAggregator::new();
        assert_eq!(verdicts.exit_code(), 0);
        verdicts.record("s", TestOutcome::skipped("interrupted"));
        assert_eq!(verdicts.exit_code(), 0);
    }

    #[test]
    fn status_serializes_snake_case() {
        let outcome = TestOutcome::skipped("no pty").with_evidence(serde_json::json!({"k": 1}));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["evidence"]["k"], 1);
        assert_eq!(TestStatus::Failed.tag(), "FAIL");
    }
}
