//! Suites: ordered probe and scenario tests sharing one application config.
//!
//! A suite comes from a YAML/JSON file ([`SuiteConfig::load`]) or from
//! [`default_suite`], takes overrides from the environment and the command
//! line, and is executed by [`run_suite`].

mod capability;
mod config;
mod default_suite;
mod runner;

pub use capability::check_pty_capability;
pub use config::{
    AutConfig, ChainedProbeCase, ProbeCase, SessionSettings, SuiteConfig, SuiteOverrides,
    TestCase, TimeoutConfig, DEFAULT_SUITE_FILES, ENV_AUT, ENV_AUT_CWD, SUITE_VERSION,
};
pub use default_suite::{default_suite, DEFAULT_PROGRAM};
pub use runner::{
    all_non_failing, run_suite, run_suite_with, NoopObserver, SuiteObserver, SuiteReport, SuiteRunOptions,
    TestResult, INTERRUPTED,
};
