//! Routes every suite test through the probe and scenario runners into the
//! verdict aggregator.

use super::capability::check_pty_capability;
use super::config::{ChainedProbeCase, ProbeCase, SuiteConfig, TestCase};
use crate::error::{ErrorCode, ErrorInfo, HarnessError, HarnessResult};
use crate::model::RunId;
use crate::probe::{
    clip, probe, select_min_by, substitute_id, JsonExpect, ProbeOutput, ProbeTarget, StdoutCheck,
};
use crate::process::duration_ms;
use crate::scenario::{run_scenario, ProgressCallback, Scenario, ScenarioReport, StepStatus};
use crate::verdict::{Summary, TestOutcome, TestStatus, VerdictAggregator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Detail recorded for tests that never ran because of an interrupt.
pub const INTERRUPTED: &str = "interrupted";

/// Receives each test's start and result as the suite runs.
pub trait SuiteObserver {
    fn on_test_started(&self, _name: &str) {}
    fn on_test_finished(&self, name: &str, outcome: &TestOutcome);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SuiteObserver for NoopObserver {
    fn on_test_finished(&self, _name: &str, _outcome: &TestOutcome) {}
}

/// Cancellation and progress wiring for [`run_suite`].
#[derive(Clone, Default)]
pub struct SuiteRunOptions {
    pub cancel: Option<Arc<AtomicBool>>,
    /// Forwarded to every scenario.
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl SuiteRunOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// One named result in a [`SuiteReport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: TestOutcome,
}

/// Everything a suite run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: RunId,
    pub suite: String,
    pub results: Vec<TestResult>,
    pub summary: Summary,
    pub exit_code: i32,
    pub interrupted: bool,
    /// Why scenario tests were skipped, when PTY support is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_error: Option<ErrorInfo>,
    pub duration_ms: u64,
}

/// Run every test in `config` in order.
///
/// Individual test failures never abort the run. The PTY capability is
/// checked once, and only if the suite has scenarios.
pub fn run_suite(
    config: &SuiteConfig,
    options: &SuiteRunOptions,
    observer: &dyn SuiteObserver,
) -> SuiteReport {
    run_suite_with(config, options, observer, check_pty_capability)
}

/// [`run_suite`] with the PTY capability check supplied by the caller.
///
/// When `capability` fails every scenario is recorded as skipped and the
/// error is kept in [`SuiteReport::capability_error`].
pub fn run_suite_with(
    config: &SuiteConfig,
    options: &SuiteRunOptions,
    observer: &dyn SuiteObserver,
    capability: impl FnOnce() -> HarnessResult<()>,
) -> SuiteReport {
    let started = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, suite = %config.name, tests = config.tests.len(), "suite started");

    let capability_error = if config.tests.iter().any(TestCase::is_scenario) {
        capability().err()
    } else {
        None
    };

    let mut verdicts = VerdictAggregator::new();
    let mut interrupted = false;
    for test in &config.tests {
        let name = test.name();
        interrupted |= options.cancelled();
        let outcome = if interrupted {
            TestOutcome::skipped(INTERRUPTED)
        } else {
            observer.on_test_started(name);
            info!(test = name, "test started");
            let outcome = run_test(config, test, options, capability_error.as_ref());
            info!(test = name, status = outcome.status.tag(), "test finished");
            outcome
        };
        observer.on_test_finished(name, &outcome);
        verdicts.record(name, outcome);
    }

    let summary = verdicts.summarize();
    let exit_code = verdicts.exit_code();
    let results = verdicts
        .into_entries()
        .into_iter()
        .map(|(name, outcome)| TestResult { name, outcome })
        .collect();
    info!(
        %run_id,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "suite finished"
    );
    SuiteReport {
        run_id,
        suite: config.name.clone(),
        results,
        summary,
        exit_code,
        interrupted,
        capability_error: capability_error.map(|err| err.to_error_info()),
        duration_ms: duration_ms(started.elapsed()),
    }
}

fn run_test(
    config: &SuiteConfig,
    test: &TestCase,
    options: &SuiteRunOptions,
    capability_error: Option<&HarnessError>,
) -> TestOutcome {
    match test {
        TestCase::Probe(case) => run_probe_case(config, case),
        TestCase::ChainedProbe(case) => run_chained_case(config, case),
        TestCase::Scenario(scenario) => match capability_error {
            Some(err) => TestOutcome::skipped(err.message.clone())
                .with_evidence(json!({ "error": err.to_error_info() })),
            None => run_scenario_case(config, scenario, options),
        },
    }
}

fn probe_timeout(config: &SuiteConfig, timeout_ms: Option<u64>) -> Duration {
    Duration::from_millis(timeout_ms.unwrap_or(config.timeouts.probe_ms))
}

fn error_outcome(err: &HarnessError) -> TestOutcome {
    TestOutcome::failed(err.to_string()).with_evidence(json!({ "error": err.to_error_info() }))
}

fn output_evidence(output: &ProbeOutput) -> Value {
    json!({
        "args": output.args,
        "exit_code": output.exit_code,
        "duration_ms": output.duration_ms,
        "stdout_chars": output.stdout.chars().count(),
        "stderr": clip(&output.stderr),
    })
}

fn run_probe_case(config: &SuiteConfig, case: &ProbeCase) -> TestOutcome {
    let mut target = config.probe_target();
    if !case.cli_prefix {
        target.cli_prefix.clear();
    }
    let output = match probe(&target, &case.args, probe_timeout(config, case.timeout_ms)) {
        Ok(output) => output,
        Err(err) => return error_outcome(&err),
    };
    check_output(&output, case.expect_success, case.json.as_ref(), &case.stdout)
}

fn check_output(
    output: &ProbeOutput,
    expect_success: bool,
    json: Option<&JsonExpect>,
    stdout_checks: &[StdoutCheck],
) -> TestOutcome {
    let evidence = output_evidence(output);
    if expect_success && !output.success() {
        return TestOutcome::failed(format!("exited with {:?}", output.exit_code))
            .with_evidence(evidence);
    }
    if let Some(expect) = json {
        if let Err(err) = expect.check(&output.stdout) {
            return TestOutcome::failed(err.to_string())
                .with_evidence(json!({ "probe": evidence, "error": err.to_error_info() }));
        }
    }
    if !StdoutCheck::any(stdout_checks, &output.stdout) {
        return TestOutcome::failed("stdout matched none of the checks").with_evidence(evidence);
    }
    TestOutcome::passed(format!("exit {:?} in {}ms", output.exit_code, output.duration_ms))
        .with_evidence(evidence)
}

fn run_chained_case(config: &SuiteConfig, case: &ChainedProbeCase) -> TestOutcome {
    let target = config.probe_target();
    let timeout = probe_timeout(config, case.timeout_ms);
    let id = match discover(&target, case, timeout) {
        Ok(Some(id)) => id,
        Ok(None) => return TestOutcome::skipped("no candidate to act on"),
        Err(reason) => return TestOutcome::skipped(format!("discovery failed: {reason}")),
    };
    info!(test = %case.name, %id, "chained probe selected id");

    let args = substitute_id(&case.args, &id);
    match probe(&target, &args, timeout) {
        Ok(output) => {
            let outcome = check_output(&output, true, case.json.as_ref(), &[]);
            let evidence = json!({ "selected_id": id, "probe": outcome.evidence });
            TestOutcome {
                evidence: Some(evidence),
                ..outcome
            }
        }
        Err(err) => error_outcome(&err),
    }
}

fn discover(
    target: &ProbeTarget,
    case: &ChainedProbeCase,
    timeout: Duration,
) -> Result<Option<Value>, String> {
    let output = probe(target, &case.discover, timeout).map_err(|err| err.to_string())?;
    if !output.success() {
        return Err(format!("exited with {:?}", output.exit_code));
    }
    let document: Value =
        serde_json::from_str(output.stdout.trim()).map_err(|err| format!("not JSON: {err}"))?;
    Ok(select_min_by(&document, &case.select))
}

fn run_scenario_case(
    config: &SuiteConfig,
    scenario: &Scenario,
    options: &SuiteRunOptions,
) -> TestOutcome {
    let mut scenario_options = config.scenario_options();
    scenario_options.cancel.clone_from(&options.cancel);
    scenario_options.progress.clone_from(&options.progress);

    let report = run_scenario(scenario, &scenario_options);
    let evidence = serde_json::to_value(&report).unwrap_or_else(|err| {
        warn!(error = %err, "failed to serialize scenario report");
        Value::Null
    });

    let interrupted = options.cancelled()
        && report
            .error
            .as_ref()
            .is_some_and(|err| err.code == ErrorCode::Timeout);
    let outcome = if interrupted {
        TestOutcome::skipped(INTERRUPTED)
    } else if report.passed {
        TestOutcome::passed(format!(
            "{} steps in {}ms",
            report.steps.len(),
            report.duration_ms
        ))
    } else {
        TestOutcome::failed(failure_detail(&report))
    };
    outcome.with_evidence(evidence)
}

/// The most specific reason a scenario failed.
fn failure_detail(report: &ScenarioReport) -> String {
    if let Some(error) = &report.error {
        return format!("{}: {}", error.code, error.message);
    }
    if let Some(failure) = report.failures.first() {
        return format!(
            "failure signature '{}' during '{}'",
            failure.indicator, failure.context
        );
    }
    report
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Failed)
        .find_map(|step| {
            step.expectations
                .iter()
                .find(|result| !result.passed)
                .map(|result| {
                    format!(
                        "step '{}': {}",
                        step.label,
                        result.message.as_deref().unwrap_or("expectation failed")
                    )
                })
        })
        .unwrap_or_else(|| "scenario failed".to_string())
}

/// Whether every recorded result is non-failing.
pub fn all_non_failing(report: &SuiteReport) -> bool {
    report
        .results
        .iter()
        .all(|result| result.outcome.status != TestStatus::Failed)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::suite::config::SuiteConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl SuiteObserver for Recording {
        fn on_test_started(&self, name: &str) {
            self.events.lock().unwrap().push(format!("start {name}"));
        }

        fn on_test_finished(&self, name: &str, outcome: &TestOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {name}", outcome.status.tag()));
        }
    }

    fn sh_suite(tests: &str) -> SuiteConfig {
        let yaml = format!(
            "suite_version: 1\nname: sh\naut:\n  program: /bin/sh\n  cli_prefix: ['-c']\ntests:\n{tests}"
        );
        SuiteConfig::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn probes_pass_fail_and_skip() {
        let suite = sh_suite(
            r#"
  - kind: probe
    name: json ok
    args: ['echo "{\"failed\": 0, \"items\": []}"']
    json:
      required_keys: [items]
      equals: {failed: 0}
  - kind: probe
    name: bad exit
    args: ['exit 2']
  - kind: chained_probe
    name: nothing to sync
    discover: ['echo "{\"items\": []}"']
    select: {array: items, id_field: set_id, min_by: size_bytes}
    args: ['echo {id}']
"#,
        );
        let observer = Recording::default();
        let report = run_suite(&suite, &SuiteRunOptions::default(), &observer);

        let statuses: Vec<TestStatus> = report.results.iter().map(|r| r.outcome.status).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Skipped]
        );
        assert_eq!(report.exit_code, 1);
        assert!(!all_non_failing(&report));
        assert!(report.capability_error.is_none());
        assert_eq!(
            observer.events.lock().unwrap()[..2],
            ["start json ok".to_string(), "PASS json ok".to_string()]
        );
    }

    #[test]
    fn chained_probe_substitutes_smallest_id() {
        let suite = sh_suite(
            r#"
  - kind: chained_probe
    name: sync smallest
    discover: ['echo "{\"items\": [{\"set_id\": 5, \"size_bytes\": 9}, {\"set_id\": 6, \"size_bytes\": 2}]}"']
    select: {array: items, id_field: set_id, min_by: size_bytes}
    args: ['test {id} = 6 && echo "{\"failed\": 0}"']
    json:
      equals: {failed: 0}
"#,
        );
        let report = run_suite(&suite, &SuiteRunOptions::default(), &NoopObserver);
        let result = &report.results[0];
        assert_eq!(result.outcome.status, TestStatus::Passed, "{result:?}");
        assert_eq!(result.outcome.evidence.as_ref().unwrap()["selected_id"], 6);
    }

    #[test]
    fn scenarios_are_skipped_without_pty_support() {
        let suite = sh_suite(
            r"
  - kind: probe
    name: probe still runs
    args: ['true']
  - kind: scenario
    name: needs a terminal
    steps:
      - {label: look, settle_ms: 0}
",
        );
        let report = run_suite_with(&suite, &SuiteRunOptions::default(), &NoopObserver, || {
            Err(HarnessError::capability(
                "cannot open a pseudo-terminal",
                "no ptys left",
            ))
        });

        assert_eq!(report.results[0].outcome.status, TestStatus::Passed);
        let scenario = &report.results[1].outcome;
        assert_eq!(scenario.status, TestStatus::Skipped);
        assert!(scenario.detail.contains("pseudo-terminal"));
        assert_eq!(scenario.evidence.as_ref().unwrap()["error"]["code"], "E_CAPABILITY");
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.exit_code, 0);
        assert!(all_non_failing(&report));
        let capability = report.capability_error.unwrap();
        assert_eq!(capability.code, ErrorCode::Capability);
    }

    #[test]
    fn capability_is_not_checked_without_scenarios() {
        let suite = sh_suite(
            r"
  - kind: probe
    name: only probe
    args: ['true']
",
        );
        let report = run_suite_with(&suite, &SuiteRunOptions::default(), &NoopObserver, || {
            panic!("capability checked for a probe-only suite")
        });
        assert!(report.capability_error.is_none());
        assert_eq!(report.exit_code, 0);
    }

    #[test]
    fn cancelled_suite_skips_everything() {
        let suite = sh_suite(
            r"
  - kind: probe
    name: a
    args: ['true']
  - kind: probe
    name: b
    args: ['true']
",
        );
        let options = SuiteRunOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            progress: None,
        };
        let report = run_suite(&suite, &options, &NoopObserver);
        assert!(report.interrupted);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.results[0].outcome.detail, INTERRUPTED);
    }
}
