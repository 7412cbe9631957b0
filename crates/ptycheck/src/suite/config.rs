//! Suite files: loading, validation and overrides.

use crate::detector::{DetectorConfig, FailureDetector};
use crate::error::{HarnessError, HarnessResult};
use crate::model::TerminalSize;
use crate::probe::{ChainSelect, JsonExpect, ProbeTarget, StdoutCheck, ID_PLACEHOLDER};
use crate::scenario::{Scenario, ScenarioOptions};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The only suite format version this build understands.
pub const SUITE_VERSION: u32 = 1;

/// Environment variable overriding the application path.
pub const ENV_AUT: &str = "PTYCHECK_AUT";
/// Environment variable overriding the application's working directory.
pub const ENV_AUT_CWD: &str = "PTYCHECK_AUT_CWD";

/// Suite file names looked up in the current directory, in order.
pub const DEFAULT_SUITE_FILES: &[&str] = &["ptycheck.yaml", "ptycheck.yml", "ptycheck.json"];

/// An ordered list of tests plus the settings they share.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub suite_version: u32,
    pub name: String,
    pub aut: AutConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub detector: DetectorConfig,
    pub tests: Vec<TestCase>,
}

/// The application under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutConfig {
    pub program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Arguments that select the non-interactive surface (`--cli`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cli_prefix: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Default per-probe timeout.
    pub probe_ms: u64,
    /// Fail scenario spawns that print nothing within this window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_ms: Option<u64>,
    pub terminate_grace_ms: u64,
    /// Default lifetime budget of one scenario.
    pub scenario_runtime_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_ms: 60_000,
            startup_ms: None,
            terminate_grace_ms: 500,
            scenario_runtime_ms: 120_000,
        }
    }
}

/// PTY geometry and capture limits for scenarios.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub rows: u16,
    pub cols: u16,
    pub retention_chars: usize,
    pub snapshot_chars: usize,
    pub screen_lines: usize,
    pub drain_max_bytes: usize,
    pub drain_poll_ms: u64,
    pub drain_window_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let size = TerminalSize::default();
        Self {
            rows: size.rows,
            cols: size.cols,
            retention_chars: crate::buffer::DEFAULT_RETENTION_CHARS,
            snapshot_chars: 10_000,
            screen_lines: 20,
            drain_max_bytes: 64 * 1024,
            drain_poll_ms: 200,
            drain_window_ms: crate::scenario::DEFAULT_DRAIN_WINDOW_MS,
        }
    }
}

/// One named test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestCase {
    Probe(ProbeCase),
    ChainedProbe(ChainedProbeCase),
    Scenario(Scenario),
}

impl TestCase {
    pub fn name(&self) -> &str {
        match self {
            Self::Probe(case) => &case.name,
            Self::ChainedProbe(case) => &case.name,
            Self::Scenario(scenario) => &scenario.name,
        }
    }

    pub fn is_scenario(&self) -> bool {
        matches!(self, Self::Scenario(_))
    }
}

/// A single non-interactive invocation and the checks on its output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeCase {
    pub name: String,
    pub args: Vec<String>,
    /// Prepend `aut.cli_prefix` to the arguments.
    #[serde(default = "default_true")]
    pub cli_prefix: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Require exit code 0.
    #[serde(default = "default_true")]
    pub expect_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonExpect>,
    /// Any-of checks on plain stdout.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stdout: Vec<StdoutCheck>,
}

/// A discovery probe whose output picks an id for a second probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainedProbeCase {
    pub name: String,
    pub discover: Vec<String>,
    pub select: ChainSelect,
    /// Arguments of the second probe; `{id}` is replaced with the selection.
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonExpect>,
}

fn default_true() -> bool {
    true
}

/// Overrides applied on top of a loaded suite, highest priority last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuiteOverrides {
    pub program: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Run only tests with these names.
    pub only: Vec<String>,
}

impl SuiteOverrides {
    /// Read `PTYCHECK_AUT` / `PTYCHECK_AUT_CWD`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            program: non_empty(ENV_AUT),
            cwd: non_empty(ENV_AUT_CWD).map(PathBuf::from),
            only: Vec::new(),
        }
    }

    /// Layer `other` over `self`; its set fields win.
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            program: other.program.or(self.program),
            cwd: other.cwd.or(self.cwd),
            only: if other.only.is_empty() {
                self.only
            } else {
                other.only
            },
        }
    }
}

impl SuiteConfig {
    /// Load a suite file: YAML for `.yaml`/`.yml`, JSON otherwise.
    ///
    /// # Errors
    /// `E_IO` if the file cannot be read, `E_CONFIG` if it does not parse or validate.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| HarnessError::io(format!("failed to read {}", path.display()), err))?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        let config = if is_yaml {
            Self::from_yaml(&text)
        } else {
            Self::from_json(&text)
        }
        .map_err(|err| HarnessError::config(format!("{}: {}", path.display(), err.message)))?;
        tracing::debug!(path = %path.display(), tests = config.tests.len(), "suite loaded");
        Ok(config)
    }

    /// # Errors
    /// `E_CONFIG` on parse or validation failure.
    pub fn from_yaml(text: &str) -> HarnessResult<Self> {
        let config: Self = serde_yml::from_str(text)
            .map_err(|err| HarnessError::config(format!("invalid suite YAML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `E_CONFIG` on parse or validation failure.
    pub fn from_json(text: &str) -> HarnessResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| HarnessError::config(format!("invalid suite JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The first of [`DEFAULT_SUITE_FILES`] present in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_SUITE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Check everything that can be checked without running anything.
    ///
    /// # Errors
    /// `E_CONFIG` describing the first problem found.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.suite_version != SUITE_VERSION {
            return Err(HarnessError::config(format!(
                "unsupported suite_version {} (expected {SUITE_VERSION})",
                self.suite_version
            )));
        }
        if self.aut.program.trim().is_empty() {
            return Err(HarnessError::config("aut.program is empty"));
        }
        if self.session.rows == 0 || self.session.cols == 0 {
            return Err(HarnessError::config("session rows and cols must be non-zero"));
        }
        FailureDetector::new(&self.detector)?;

        let mut names = BTreeSet::new();
        for test in &self.tests {
            let name = test.name();
            if name.trim().is_empty() {
                return Err(HarnessError::config("test with an empty name"));
            }
            if !names.insert(name) {
                return Err(HarnessError::config(format!("duplicate test name '{name}'")));
            }
            match test {
                TestCase::Scenario(scenario) => scenario.validate()?,
                TestCase::ChainedProbe(case) => {
                    if !case.args.iter().any(|arg| arg.contains(ID_PLACEHOLDER)) {
                        return Err(HarnessError::config(format!(
                            "chained probe '{name}' never uses {ID_PLACEHOLDER}"
                        )));
                    }
                }
                TestCase::Probe(_) => {}
            }
        }
        Ok(())
    }

    /// Apply overrides and drop tests not named in `only`.
    ///
    /// # Errors
    /// `E_CONFIG` if `only` names a test the suite does not have.
    pub fn apply_overrides(&mut self, overrides: &SuiteOverrides) -> HarnessResult<()> {
        if let Some(program) = &overrides.program {
            self.aut.program.clone_from(program);
        }
        if let Some(cwd) = &overrides.cwd {
            self.aut.cwd = Some(cwd.clone());
        }
        if overrides.only.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = overrides
            .only
            .iter()
            .find(|name| !self.tests.iter().any(|test| test.name() == name.as_str()))
        {
            return Err(HarnessError::config(format!("--only: no test named '{unknown}'")));
        }
        self.tests
            .retain(|test| overrides.only.iter().any(|name| name == test.name()));
        Ok(())
    }

    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            program: self.aut.program.clone(),
            cli_prefix: self.aut.cli_prefix.clone(),
            cwd: self.aut.cwd.clone(),
            env: self.aut.env.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cwd: self.aut.cwd.clone(),
            env: self.aut.env.clone(),
            size: TerminalSize {
                rows: self.session.rows,
                cols: self.session.cols,
            },
            startup_timeout: self.timeouts.startup_ms.map(Duration::from_millis),
            retention_chars: self.session.retention_chars,
            ..SessionConfig::new(self.aut.program.clone())
        }
    }

    /// Scenario options without cancellation or progress wiring.
    pub fn scenario_options(&self) -> ScenarioOptions {
        ScenarioOptions {
            detector: self.detector.clone(),
            snapshot_chars: self.session.snapshot_chars,
            screen_lines: self.session.screen_lines,
            drain_max_bytes: self.session.drain_max_bytes,
            drain_poll: Duration::from_millis(self.session.drain_poll_ms),
            drain_window: Duration::from_millis(self.session.drain_window_ms),
            terminate_grace: Duration::from_millis(self.timeouts.terminate_grace_ms),
            max_runtime: Duration::from_millis(self.timeouts.scenario_runtime_ms),
            ..ScenarioOptions::new(self.session_config())
        }
    }

    /// # Errors
    /// `E_INTERNAL` if serialization fails.
    pub fn to_yaml(&self) -> HarnessResult<String> {
        serde_yml::to_string(self)
            .map_err(|err| HarnessError::internal(format!("failed to serialize suite: {err}")))
    }

    /// # Errors
    /// `E_INTERNAL` if serialization fails.
    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| HarnessError::internal(format!("failed to serialize suite: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    const MINIMAL: &str = r"
suite_version: 1
name: minimal
aut:
  program: /bin/cat
tests:
  - kind: probe
    name: echo
    args: [hello]
    cli_prefix: false
    stdout:
      - type: contains
        text: hello
  - kind: scenario
    name: type
    initial_settle_ms: 0
    steps:
      - label: enter
        keys: [Enter]
";

    #[test]
    fn minimal_yaml_loads_with_defaults() {
        let suite = SuiteConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.timeouts, TimeoutConfig::default());
        assert_eq!(suite.session.snapshot_chars, 10_000);
        assert!(suite.tests[1].is_scenario());
        let TestCase::Probe(probe) = &suite.tests[0] else {
            panic!("expected probe");
        };
        assert!(probe.expect_success);
        assert!(!probe.cli_prefix);
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("ptycheck.yaml");
        std::fs::File::create(&yaml)
            .unwrap()
            .write_all(MINIMAL.as_bytes())
            .unwrap();
        let suite = SuiteConfig::load(&yaml).unwrap();

        let json = dir.path().join("suite.json");
        std::fs::write(&json, suite.to_json().unwrap()).unwrap();
        assert_eq!(SuiteConfig::load(&json).unwrap(), suite);

        assert_eq!(SuiteConfig::discover(dir.path()), Some(yaml));
    }

    #[test]
    fn invalid_suites_are_config_errors() {
        let cases = [
            MINIMAL.replace("suite_version: 1", "suite_version: 9"),
            MINIMAL.replace("program: /bin/cat", "program: ''"),
            MINIMAL.replace("name: type", "name: echo"),
            MINIMAL.replace("keys: [Enter]", "keys: [Hyper]"),
            MINIMAL.replace("name: minimal", "name: minimal\nbogus: 1"),
        ];
        for text in &cases {
            let err = SuiteConfig::from_yaml(text).unwrap_err();
            assert_eq!(err.code, ErrorCode::Config, "{text}");
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SuiteConfig::load(Path::new("/nonexistent/ptycheck.yaml")).unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }

    #[test]
    fn overrides_layer_env_then_flags() {
        let env = SuiteOverrides::from_lookup(|key| match key {
            ENV_AUT => Some("/env/app".to_string()),
            ENV_AUT_CWD => Some("/env/cwd".to_string()),
            _ => None,
        });
        let flags = SuiteOverrides {
            program: Some("/flag/app".to_string()),
            cwd: None,
            only: vec!["type".to_string()],
        };
        let merged = env.merged(flags);

        let mut suite = SuiteConfig::from_yaml(MINIMAL).unwrap();
        suite.apply_overrides(&merged).unwrap();
        assert_eq!(suite.aut.program, "/flag/app");
        assert_eq!(suite.aut.cwd, Some(PathBuf::from("/env/cwd")));
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.tests[0].name(), "type");
    }

    #[test]
    fn only_with_unknown_name_is_rejected() {
        let mut suite = SuiteConfig::from_yaml(MINIMAL).unwrap();
        let overrides = SuiteOverrides {
            only: vec!["nope".to_string()],
            ..SuiteOverrides::default()
        };
        assert_eq!(
            suite.apply_overrides(&overrides).unwrap_err().code,
            ErrorCode::Config
        );
    }

    #[test]
    fn scenario_options_follow_settings() {
        let mut suite = SuiteConfig::from_yaml(MINIMAL).unwrap();
        suite.session.rows = 40;
        suite.timeouts.startup_ms = Some(1_500);
        let options = suite.scenario_options();
        assert_eq!(options.session.size.rows, 40);
        assert_eq!(options.session.command, "/bin/cat");
        assert_eq!(options.session.startup_timeout, Some(Duration::from_millis(1_500)));
        assert_eq!(options.drain_poll, Duration::from_millis(200));
        assert_eq!(options.drain_window, Duration::from_secs(1));
    }
}
