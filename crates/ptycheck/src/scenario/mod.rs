//! Scripted scenario execution against one live session.
//!
//! A [`Scenario`] is an ordered list of [`ScenarioStep`]s. [`run_scenario`]
//! spawns the application, waits a fixed initial settle period, then for each
//! step sends its input, sleeps its settle time, drains output, runs the
//! failure detector, captures screen evidence and evaluates expectations.
//! Detector trips and failed expectations fail the scenario without stopping
//! it, so later steps still produce evidence. The session is terminated on
//! every path.

mod progress;

pub use progress::{NoopProgress, ProgressCallback, ProgressEvent};

use crate::detector::{DetectorConfig, FailureDetector, FailureSignature};
use crate::error::{ErrorCode, ErrorInfo, HarnessError, HarnessResult};
use crate::model::{Key, ScreenSnapshot, SessionId};
use crate::process::duration_ms;
use crate::session::{ExitInfo, Session, SessionConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default fixed wait after spawn, before the first step.
pub const DEFAULT_INITIAL_SETTLE_MS: u64 = 6_000;
/// Default pause between keys within one step.
pub const DEFAULT_KEY_DELAY_MS: u64 = 100;
/// Default cap on one post-step observation.
pub const DEFAULT_DRAIN_WINDOW_MS: u64 = 1_000;
/// Evidence lines are clipped to this many characters.
pub const EVIDENCE_LINE_WIDTH: usize = 120;

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// An ordered script of input-and-wait steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    /// Extra arguments appended to the application's interactive launch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Fixed wait after spawn for startup work to finish.
    #[serde(default = "default_initial_settle_ms")]
    pub initial_settle_ms: u64,
    /// Overrides [`ScenarioOptions::max_runtime`] for this scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime_ms: Option<u64>,
    pub steps: Vec<ScenarioStep>,
}

fn default_initial_settle_ms() -> u64 {
    DEFAULT_INITIAL_SETTLE_MS
}

/// One unit of scripted work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioStep {
    /// Context label used in reports and failure signatures.
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
    /// Literal text sent after the keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Pause between consecutive keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_delay_ms: Option<u64>,
    /// Wait after sending before output is inspected.
    #[serde(default)]
    pub settle_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Expectation>,
    /// The application may exit during this step; later steps are then skipped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_exit: bool,
}

impl ScenarioStep {
    /// A step that presses `keys` and settles for `settle_ms`.
    pub fn keys(label: impl Into<String>, keys: Vec<Key>, settle_ms: u64) -> Self {
        Self {
            label: label.into(),
            keys,
            text: None,
            key_delay_ms: None,
            settle_ms,
            expect: Vec::new(),
            allow_exit: false,
        }
    }

    #[must_use]
    pub fn expecting(mut self, expectation: Expectation) -> Self {
        self.expect.push(expectation);
        self
    }
}

/// Assertion over the state after a step settles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Expectation {
    /// Normalized screen contains the text (case-insensitive).
    ScreenContains { text: String },
    /// Normalized screen does not contain the text (case-insensitive).
    ScreenNotContains { text: String },
    /// Some normalized line matches the regex.
    ScreenMatches { pattern: String },
    /// Emulated grid contains the text (case-sensitive).
    GridContains { text: String },
    /// Application is still running.
    Alive,
    /// Application has exited, optionally with a specific code.
    Exited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u32>,
    },
}

/// Result of one expectation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationResult {
    pub expectation: Expectation,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Step outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// Evidence and status for one step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based position in the scenario.
    pub step_index: usize,
    pub label: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub bytes_read: usize,
    pub detector_tripped: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expectations: Vec<ExpectationResult>,
    /// Last normalized screen lines after the step settled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screen: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Verdict and evidence for a whole scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub steps: Vec<StepReport>,
    pub failures: Vec<FailureSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub alive_before_teardown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitInfo>,
    pub final_screen: Vec<String>,
    pub duration_ms: u64,
}

/// How a scenario is run: where the application is and how to observe it.
#[derive(Clone)]
pub struct ScenarioOptions {
    /// Base session configuration; the scenario's own args are appended.
    pub session: SessionConfig,
    pub detector: DetectorConfig,
    /// Raw characters normalized into each snapshot.
    pub snapshot_chars: usize,
    /// Snapshot lines kept as per-step evidence.
    pub screen_lines: usize,
    pub drain_max_bytes: usize,
    pub drain_poll: Duration,
    /// Longest single observation; also capped by what is left of `max_runtime`.
    pub drain_window: Duration,
    pub terminate_grace: Duration,
    /// Lifetime budget for the whole scenario, settle time included.
    pub max_runtime: Duration,
    pub cancel: Option<Arc<AtomicBool>>,
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl ScenarioOptions {
    /// Defaults for everything except the session.
    pub fn new(session: SessionConfig) -> Self {
        Self {
            session,
            detector: DetectorConfig::default(),
            snapshot_chars: 10_000,
            screen_lines: 20,
            drain_max_bytes: 64 * 1024,
            drain_poll: Duration::from_millis(200),
            drain_window: Duration::from_millis(DEFAULT_DRAIN_WINDOW_MS),
            terminate_grace: Duration::from_millis(500),
            max_runtime: Duration::from_secs(120),
            cancel: None,
            progress: None,
        }
    }
}

impl Scenario {
    /// A scenario with the default initial settle and no extra arguments.
    pub fn new(name: impl Into<String>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            initial_settle_ms: DEFAULT_INITIAL_SETTLE_MS,
            max_runtime_ms: None,
            steps,
        }
    }

    /// Check patterns and structure before anything is spawned.
    ///
    /// # Errors
    /// `E_CONFIG` on an empty name or label, or an invalid `screen_matches` pattern.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::config("scenario name is empty"));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.label.trim().is_empty() {
                return Err(HarnessError::config(format!(
                    "step {} has an empty label",
                    index + 1
                )));
            }
            for expectation in &step.expect {
                if let Expectation::ScreenMatches { pattern } = expectation {
                    Regex::new(pattern).map_err(|err| {
                        HarnessError::config(format!(
                            "step '{}': invalid screen_matches pattern '{pattern}': {err}",
                            step.label
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Run `scenario` to completion and report its verdict.
///
/// Never fails: spawn, write, and timeout errors become part of the report.
pub fn run_scenario(scenario: &Scenario, options: &ScenarioOptions) -> ScenarioReport {
    let name = scenario.name.as_str();
    let run = ScenarioRun::new(scenario, options);
    run.emit(ProgressEvent::ScenarioStarted {
        name: name.to_string(),
        total_steps: scenario.steps.len(),
    });
    info!(scenario = name, steps = scenario.steps.len(), "scenario started");

    let report = match run.prepare() {
        Ok((session, detector)) => run.execute(session, detector),
        Err(err) => run.abort(err),
    };

    run.emit(ProgressEvent::ScenarioCompleted {
        name: name.to_string(),
        passed: report.passed,
        duration_ms: report.duration_ms,
    });
    info!(scenario = name, passed = report.passed, "scenario finished");
    report
}

struct ScenarioRun<'a> {
    name: &'a str,
    scenario: &'a Scenario,
    options: &'a ScenarioOptions,
    max_runtime: Duration,
    started: Instant,
}

/// What a step decided about the rest of the scenario.
enum StepFlow {
    Continue,
    /// Application exited where that was allowed.
    ExitAllowed,
    Stop(HarnessError),
}

impl<'a> ScenarioRun<'a> {
    fn new(scenario: &'a Scenario, options: &'a ScenarioOptions) -> Self {
        Self {
            name: &scenario.name,
            scenario,
            options,
            max_runtime: scenario
                .max_runtime_ms
                .map_or(options.max_runtime, Duration::from_millis),
            started: Instant::now(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.options.progress {
            progress.on_progress(&event);
        }
    }

    fn prepare(&self) -> HarnessResult<(Session, FailureDetector)> {
        self.scenario.validate()?;
        let detector = FailureDetector::new(&self.options.detector)?;
        let mut config = self.options.session.clone();
        config.args.extend(self.scenario.args.iter().cloned());
        let session = Session::spawn(config)?;
        Ok((session, detector))
    }

    fn abort(&self, err: HarnessError) -> ScenarioReport {
        warn!(scenario = self.name, error = %err, "scenario could not start");
        let steps = (1..=self.scenario.steps.len())
            .zip(&self.scenario.steps)
            .map(|(step_index, step)| skipped_step(step_index, step))
            .collect();
        ScenarioReport {
            name: self.name.to_string(),
            passed: false,
            session_id: None,
            steps,
            failures: Vec::new(),
            error: Some(err.to_error_info()),
            alive_before_teardown: false,
            exit: None,
            final_screen: Vec::new(),
            duration_ms: self.elapsed_ms(),
        }
    }

    fn execute(&self, mut session: Session, mut detector: FailureDetector) -> ScenarioReport {
        let mut run_error: Option<HarnessError> = None;
        let mut exit_allowed = false;

        match self.pause(Duration::from_millis(self.scenario.initial_settle_ms)) {
            Ok(()) => {
                if let Err(err) = self.observe(&mut session) {
                    run_error = Some(err);
                }
                detector.check(session.buffer().tail(detector.tail_chars()), "startup");
                if run_error.is_none() && !session.is_alive() {
                    run_error = Some(unexpected_exit(&session, "startup"));
                }
            }
            Err(err) => run_error = Some(err),
        }

        let mut steps = Vec::with_capacity(self.scenario.steps.len());
        for (offset, step) in self.scenario.steps.iter().enumerate() {
            let step_index = offset + 1;
            if run_error.is_some() || exit_allowed {
                steps.push(skipped_step(step_index, step));
                continue;
            }
            if let Err(err) = self.budget_check() {
                run_error = Some(err);
                steps.push(skipped_step(step_index, step));
                continue;
            }

            self.emit(ProgressEvent::StepStarted {
                step_index,
                label: step.label.clone(),
            });
            let (report, flow) = self.run_step(&mut session, &mut detector, step_index, step);
            self.emit(ProgressEvent::StepCompleted {
                step_index,
                label: report.label.clone(),
                status: report.status,
                duration_ms: report.duration_ms,
                screen: report.screen.clone(),
            });
            steps.push(report);
            match flow {
                StepFlow::Continue => {}
                StepFlow::ExitAllowed => exit_allowed = true,
                StepFlow::Stop(err) => run_error = Some(err),
            }
        }

        self.finish(session, detector, steps, run_error)
    }

    fn run_step(
        &self,
        session: &mut Session,
        detector: &mut FailureDetector,
        step_index: usize,
        step: &ScenarioStep,
    ) -> (StepReport, StepFlow) {
        let step_started = Instant::now();
        info!(step = %step.label, step_index, "running step");

        let mut flow = match self.send_input(session, step) {
            Ok(()) => StepFlow::Continue,
            Err(err) if err.code == ErrorCode::UnexpectedExit && step.allow_exit => {
                StepFlow::ExitAllowed
            }
            Err(err) if err.code == ErrorCode::UnexpectedExit => {
                StepFlow::Stop(unexpected_exit(session, &step.label))
            }
            Err(err) => StepFlow::Stop(err),
        };

        if matches!(flow, StepFlow::Continue) {
            if let Err(err) = self.pause(Duration::from_millis(step.settle_ms)) {
                flow = StepFlow::Stop(err);
            }
        }

        let bytes_read = match self.observe(session) {
            Ok(read) => read,
            Err(err) => {
                if matches!(flow, StepFlow::Continue) {
                    flow = StepFlow::Stop(err);
                }
                0
            }
        };
        let detector_tripped =
            detector.check(session.buffer().tail(detector.tail_chars()), &step.label);
        let snapshot = session.snapshot(self.options.snapshot_chars);

        if matches!(flow, StepFlow::Continue) && !session.is_alive() {
            flow = if step.allow_exit {
                StepFlow::ExitAllowed
            } else {
                StepFlow::Stop(unexpected_exit(session, &step.label))
            };
        }

        let expectations: Vec<ExpectationResult> = step
            .expect
            .iter()
            .map(|expectation| evaluate(expectation, &snapshot, session))
            .collect();
        let failed = detector_tripped
            || matches!(flow, StepFlow::Stop(_))
            || expectations.iter().any(|result| !result.passed);

        let report = StepReport {
            step_index,
            label: step.label.clone(),
            status: if failed {
                StepStatus::Failed
            } else {
                StepStatus::Passed
            },
            duration_ms: duration_ms(step_started.elapsed()),
            bytes_read,
            detector_tripped,
            expectations,
            screen: snapshot.evidence(self.options.screen_lines, EVIDENCE_LINE_WIDTH),
            error: match &flow {
                StepFlow::Stop(err) => Some(err.to_error_info()),
                _ => None,
            },
        };
        (report, flow)
    }

    fn send_input(&self, session: &mut Session, step: &ScenarioStep) -> HarnessResult<()> {
        let delay = Duration::from_millis(step.key_delay_ms.unwrap_or(DEFAULT_KEY_DELAY_MS));
        for (position, key) in step.keys.iter().enumerate() {
            if position > 0 {
                self.pause(delay)?;
            }
            session.send_key(*key)?;
        }
        if let Some(text) = &step.text {
            if !step.keys.is_empty() {
                self.pause(delay)?;
            }
            session.send_text(text)?;
        }
        Ok(())
    }

    /// Drain, then fail with `E_TIMEOUT` if the budget ran out meanwhile.
    fn observe(&self, session: &mut Session) -> HarnessResult<usize> {
        let read = self.drain(session)?;
        self.budget_check()?;
        Ok(read)
    }

    fn drain(&self, session: &mut Session) -> HarnessResult<usize> {
        let budget_left = self.max_runtime.saturating_sub(self.started.elapsed());
        session.drain_until_quiet(
            self.options.drain_max_bytes,
            self.options.drain_poll,
            self.options.drain_window.min(budget_left),
        )
    }

    fn finish(
        &self,
        mut session: Session,
        detector: FailureDetector,
        steps: Vec<StepReport>,
        mut run_error: Option<HarnessError>,
    ) -> ScenarioReport {
        if let Err(err) = self.drain(&mut session) {
            warn!(error = %err, "final drain failed");
        }
        let alive_before_teardown = session.is_alive();
        let final_screen = session
            .snapshot(self.options.snapshot_chars)
            .evidence(self.options.screen_lines, EVIDENCE_LINE_WIDTH);

        let exit = match session.terminate(self.options.terminate_grace) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(error = %err, "session teardown failed");
                if run_error.is_none() {
                    run_error = Some(err);
                }
                None
            }
        };

        let failures = detector.failures().to_vec();
        let passed = failures.is_empty()
            && run_error.is_none()
            && steps.iter().all(|step| step.status != StepStatus::Failed);

        ScenarioReport {
            name: self.name.to_string(),
            passed,
            session_id: Some(session.session_id()),
            steps,
            failures,
            error: run_error.map(|err| err.to_error_info()),
            alive_before_teardown,
            exit,
            final_screen,
            duration_ms: self.elapsed_ms(),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or budget exhaustion.
    fn pause(&self, duration: Duration) -> HarnessResult<()> {
        let until = Instant::now() + duration;
        loop {
            self.budget_check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep(PAUSE_SLICE.min(until - now));
        }
    }

    fn budget_check(&self) -> HarnessResult<()> {
        if self
            .options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(HarnessError::timeout(
                "scenario interrupted",
                serde_json::json!({ "interrupted": true }),
            ));
        }
        if self.started.elapsed() > self.max_runtime {
            return Err(HarnessError::timeout(
                "scenario exceeded max runtime budget",
                serde_json::json!({ "max_runtime_ms": duration_ms(self.max_runtime) }),
            ));
        }
        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        duration_ms(self.started.elapsed())
    }
}

fn unexpected_exit(session: &Session, context: &str) -> HarnessError {
    HarnessError::unexpected_exit(
        format!("unexpected exit during '{context}'"),
        serde_json::json!({ "context": context, "exit": session.exit_info() }),
    )
}

fn skipped_step(step_index: usize, step: &ScenarioStep) -> StepReport {
    StepReport {
        step_index,
        label: step.label.clone(),
        status: StepStatus::Skipped,
        duration_ms: 0,
        bytes_read: 0,
        detector_tripped: false,
        expectations: Vec::new(),
        screen: Vec::new(),
        error: None,
    }
}

fn evaluate(
    expectation: &Expectation,
    snapshot: &ScreenSnapshot,
    session: &mut Session,
) -> ExpectationResult {
    let (passed, message) = match expectation {
        Expectation::ScreenContains { text } => {
            let found = snapshot.contains(text);
            (found, (!found).then(|| format!("'{text}' not on screen")))
        }
        Expectation::ScreenNotContains { text } => {
            let found = snapshot.contains(text);
            (!found, found.then(|| format!("'{text}' unexpectedly on screen")))
        }
        Expectation::ScreenMatches { pattern } => match Regex::new(pattern) {
            Ok(regex) => {
                let found = snapshot.lines.iter().any(|line| regex.is_match(line));
                (found, (!found).then(|| format!("no line matches /{pattern}/")))
            }
            Err(err) => (false, Some(format!("invalid pattern: {err}"))),
        },
        Expectation::GridContains { text } => {
            let found = session.emulated_screen().contains(text);
            (found, (!found).then(|| format!("'{text}' not in emulated grid")))
        }
        Expectation::Alive => {
            let alive = session.is_alive();
            (alive, (!alive).then(|| "application is not running".to_string()))
        }
        Expectation::Exited { code } => evaluate_exit(*code, session),
    };
    ExpectationResult {
        expectation: expectation.clone(),
        passed,
        message,
    }
}

fn evaluate_exit(code: Option<u32>, session: &mut Session) -> (bool, Option<String>) {
    if session.is_alive() {
        return (false, Some("application is still running".to_string()));
    }
    let actual = session.exit_info().and_then(|info| info.exit_code);
    match code {
        Some(expected) if actual != Some(expected) => (
            false,
            Some(format!("expected exit code {expected}, got {actual:?}")),
        ),
        _ => (true, None),
    }
}
