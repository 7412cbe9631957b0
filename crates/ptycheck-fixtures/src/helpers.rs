//! Suite builders for driving the menu fixture.
//!
//! The built-in suite is paced for a real application with a slow startup
//! scan. These helpers point it at the fixture and shorten its waits.

use crate::menu::ENV_SCAN_MS;
use ptycheck::suite::{default_suite, SuiteConfig, TestCase};

const SCAN_MS: &str = "200";
const MAX_INITIAL_SETTLE_MS: u64 = 1_500;
const MAX_STEP_SETTLE_MS: u64 = 400;
const MAX_KEY_DELAY_MS: u64 = 100;

/// The built-in suite aimed at `program`, with settle times capped.
///
/// # Example
///
/// ```ignore
/// let suite = fast_default_suite(env!("CARGO_BIN_EXE_ptycheck-menu-app"));
/// let report = run_suite(&suite, &SuiteRunOptions::default(), &NoopObserver);
/// ```
#[must_use]
pub fn fast_default_suite(program: &str) -> SuiteConfig {
    let mut suite = default_suite();
    suite.aut.program = program.to_string();
    suite
        .aut
        .env
        .insert(ENV_SCAN_MS.to_string(), SCAN_MS.to_string());
    for test in &mut suite.tests {
        let TestCase::Scenario(scenario) = test else {
            continue;
        };
        scenario.initial_settle_ms = scenario.initial_settle_ms.min(MAX_INITIAL_SETTLE_MS);
        for step in &mut scenario.steps {
            step.settle_ms = step.settle_ms.min(MAX_STEP_SETTLE_MS);
            step.key_delay_ms = step.key_delay_ms.map(|delay| delay.min(MAX_KEY_DELAY_MS));
        }
    }
    suite
}
