//! The built-in suite: CLI probes, snapshot probes and menu walkthroughs for an
//! application with a welcome screen, a main menu navigated with arrows and
//! Enter, and Escape to back out.

use super::config::{
    AutConfig, ChainedProbeCase, ProbeCase, SessionSettings, SuiteConfig, TestCase,
    TimeoutConfig, SUITE_VERSION,
};
use crate::detector::DetectorConfig;
use crate::model::Key;
use crate::probe::{ChainSelect, ItemRule, JsonExpect, StdoutCheck, ID_PLACEHOLDER};
use crate::scenario::{Expectation, Scenario, ScenarioStep};
use serde_json::json;
use std::collections::BTreeMap;

/// Program launched when neither the suite nor the environment names one.
pub const DEFAULT_PROGRAM: &str = "./target/release/osu-sync";

const SNAPSHOT_TIMEOUT_MS: u64 = 15_000;
const EXIT_PRESSES: usize = 10;
const EXIT_KEY_DELAY_MS: u64 = 200;

/// Build the default suite.
pub fn default_suite() -> SuiteConfig {
    let mut tests = cli_probes();
    tests.extend(snapshot_probes());
    tests.extend(scenarios().into_iter().map(TestCase::Scenario));
    SuiteConfig {
        suite_version: SUITE_VERSION,
        name: "osu-sync feature tests".to_string(),
        aut: AutConfig {
            program: DEFAULT_PROGRAM.to_string(),
            cwd: None,
            env: BTreeMap::new(),
            cli_prefix: vec!["--cli".to_string()],
        },
        timeouts: TimeoutConfig::default(),
        session: SessionSettings::default(),
        detector: DetectorConfig::default(),
        tests,
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|arg| (*arg).to_string()).collect()
}

fn import_rule() -> ItemRule {
    ItemRule {
        array: "items".to_string(),
        when_field: "action".to_string(),
        when_equals: json!("Import"),
        require: "set_id".to_string(),
    }
}

fn cli_probe(name: &str, argv: &[&str], json: JsonExpect) -> TestCase {
    TestCase::Probe(ProbeCase {
        name: name.to_string(),
        args: args(argv),
        cli_prefix: true,
        timeout_ms: None,
        expect_success: true,
        json: Some(json),
        stdout: Vec::new(),
    })
}

/// `items` may be empty when there is nothing left to sync.
fn dry_run(name: &str, direction: &str) -> TestCase {
    cli_probe(
        name,
        &["dry-run", direction, "--json"],
        JsonExpect {
            required_keys: args(&["items"]),
            item_rules: vec![import_rule()],
            ..JsonExpect::default()
        },
    )
}

fn chained_sync(name: &str, direction: &str) -> TestCase {
    TestCase::ChainedProbe(ChainedProbeCase {
        name: name.to_string(),
        discover: args(&["dry-run", direction, "--json"]),
        select: ChainSelect {
            array: "items".to_string(),
            where_field: Some("action".to_string()),
            equals: json!("Import"),
            id_field: "set_id".to_string(),
            min_by: "size_bytes".to_string(),
        },
        args: args(&["sync", direction, "--set-ids", ID_PLACEHOLDER, "--json"]),
        timeout_ms: Some(60_000),
        json: Some(JsonExpect {
            equals: BTreeMap::from([("failed".to_string(), json!(0))]),
            ..JsonExpect::default()
        }),
    })
}

fn cli_probes() -> Vec<TestCase> {
    vec![
        cli_probe(
            "CLI: Scan",
            &["scan", "--json"],
            JsonExpect {
                required_keys: args(&["stable", "lazer"]),
                counts: args(&["stable.beatmap_sets", "lazer.beatmap_sets"]),
                ..JsonExpect::default()
            },
        ),
        dry_run("CLI: Dry-run S2L", "s2l"),
        dry_run("CLI: Dry-run L2S", "l2s"),
        dry_run("CLI: Dry-run Bidirectional", "bi"),
        chained_sync("CLI: Sync S2L", "s2l"),
        chained_sync("CLI: Sync L2S", "l2s"),
    ]
}

fn snapshot_probes() -> Vec<TestCase> {
    let snapshot = |name: &str, argv: &[&str]| ProbeCase {
        name: name.to_string(),
        args: args(argv),
        cli_prefix: false,
        timeout_ms: Some(SNAPSHOT_TIMEOUT_MS),
        expect_success: false,
        json: None,
        stdout: Vec::new(),
    };
    vec![
        TestCase::Probe(ProbeCase {
            stdout: vec![
                StdoutCheck::MinLen { chars: 101 },
                StdoutCheck::Contains {
                    text: "osu-sync".to_string(),
                },
            ],
            ..snapshot("TUI Snapshot", &["--tui-snapshot"])
        }),
        TestCase::Probe(ProbeCase {
            json: Some(JsonExpect {
                lenient: true,
                ..JsonExpect::default()
            }),
            ..snapshot("TUI Snapshot JSON", &["--tui-snapshot", "--json"])
        }),
    ]
}

fn press(label: &str, key: Key, settle_ms: u64) -> ScenarioStep {
    ScenarioStep::keys(label, vec![key], settle_ms)
}

fn downs(label: &str, count: usize) -> ScenarioStep {
    ScenarioStep {
        key_delay_ms: Some(300),
        ..ScenarioStep::keys(label, vec![Key::Down; count], 300)
    }
}

/// Escape repeatedly until the application quits.
fn exit_app() -> ScenarioStep {
    ScenarioStep {
        key_delay_ms: Some(EXIT_KEY_DELAY_MS),
        allow_exit: true,
        ..ScenarioStep::keys("exit", vec![Key::Escape; EXIT_PRESSES], EXIT_KEY_DELAY_MS)
    }
}

fn scenario(name: &str, initial_settle_ms: u64, mut steps: Vec<ScenarioStep>) -> Scenario {
    steps.push(exit_app());
    Scenario {
        initial_settle_ms,
        ..Scenario::new(name, steps)
    }
}

/// Open the entry `down` rows below the top of the main menu, then back out.
fn menu_visit(name: &str, down: usize, inside: Vec<ScenarioStep>) -> Scenario {
    let mut steps = vec![press("main menu", Key::Enter, 1_000)];
    if down > 0 {
        steps.push(downs("navigate", down));
    }
    steps.push(press("open", Key::Enter, 2_000));
    steps.extend(inside);
    steps.push(press("back", Key::Escape, 500));
    scenario(name, 5_000, steps)
}

fn scenarios() -> Vec<Scenario> {
    let full_navigation = vec![
        press("Enter main menu", Key::Enter, 1_000),
        press("Sync menu", Key::Enter, 2_000),
        press("Back from sync", Key::Escape, 1_000),
        ScenarioStep {
            key_delay_ms: Some(100),
            ..ScenarioStep::keys("Down to collections", vec![Key::Down, Key::Down], 500)
        },
        press("Enter collections", Key::Enter, 2_000),
        press("Back from collections", Key::Escape, 1_000),
        press("Down to backup", Key::Down, 300),
        press("Enter backup", Key::Enter, 2_000),
        press("Back from backup", Key::Escape, 1_000),
        press("Down to media", Key::Down, 300),
        press("Enter media", Key::Enter, 2_000),
        press("Back from media", Key::Escape, 1_000),
        press("Down to replays", Key::Down, 300),
        press("Enter replays", Key::Enter, 2_000),
        press("Back from replays", Key::Escape, 1_000),
        press("Down to settings", Key::Down, 300),
        press("Enter settings", Key::Enter, 2_000),
        press("Back from settings", Key::Escape, 1_000),
    ];
    let rescan = vec![
        press("main menu", Key::Enter, 1_000),
        press("rescan", Key::Char('r'), 5_000),
    ];
    let smoke = vec![
        press("main menu", Key::Enter, 1_000),
        press("first entry", Key::Enter, 2_000),
        press("back", Key::Escape, 1_000),
        press("back to welcome", Key::Escape, 1_000).expecting(Expectation::Alive),
    ];

    vec![
        scenario("TUI: Full Navigation", 6_000, full_navigation),
        scenario("TUI: Rescan", 5_000, rescan),
        Scenario {
            initial_settle_ms: 6_000,
            ..Scenario::new("TUI: Smoke", smoke)
        },
        menu_visit(
            "TUI: Sync Preview",
            0,
            vec![downs("sync options", 2), press("back to menu", Key::Escape, 1_000)],
        ),
        menu_visit("TUI: Backup Menu", 3, vec![downs("backup options", 2)]),
        menu_visit("TUI: Media Menu", 4, Vec::new()),
        menu_visit("TUI: Replays Menu", 5, Vec::new()),
        menu_visit("TUI: Settings Menu", 6, vec![downs("settings options", 1)]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suite_validates() {
        let suite = default_suite();
        suite.validate().unwrap();
        assert_eq!(suite.aut.cli_prefix, vec!["--cli".to_string()]);
    }

    #[test]
    fn default_suite_covers_every_category() {
        let suite = default_suite();
        let names: Vec<&str> = suite.tests.iter().map(TestCase::name).collect();
        for expected in [
            "CLI: Scan",
            "CLI: Sync S2L",
            "TUI Snapshot JSON",
            "TUI: Full Navigation",
            "TUI: Smoke",
            "TUI: Settings Menu",
        ] {
            assert!(names.contains(&expected), "{expected}");
        }
        assert!(suite.tests.iter().filter(|test| test.is_scenario()).count() >= 8);
    }

    #[test]
    fn smoke_scenario_keeps_the_app_running() {
        let suite = default_suite();
        let Some(TestCase::Scenario(smoke)) =
            suite.tests.iter().find(|test| test.name() == "TUI: Smoke")
        else {
            panic!("smoke scenario missing");
        };
        let keys: Vec<Key> = smoke.steps.iter().flat_map(|step| step.keys.clone()).collect();
        assert_eq!(keys, vec![Key::Enter, Key::Enter, Key::Escape, Key::Escape]);
        assert!(smoke.steps.iter().all(|step| !step.allow_exit));
    }

    #[test]
    fn dry_runs_accept_an_empty_plan() {
        let suite = default_suite();
        for name in ["CLI: Dry-run S2L", "CLI: Dry-run L2S", "CLI: Dry-run Bidirectional"] {
            let Some(TestCase::Probe(case)) = suite.tests.iter().find(|test| test.name() == name)
            else {
                panic!("{name} missing");
            };
            let expect = case.json.as_ref().unwrap();
            expect.check(r#"{"items": []}"#).unwrap();
            assert!(expect.check(r#"{"plan": []}"#).is_err(), "{name}");
        }
    }

    #[test]
    fn default_suite_round_trips_through_yaml() {
        let suite = default_suite();
        let yaml = suite.to_yaml().unwrap();
        assert_eq!(SuiteConfig::from_yaml(&yaml).unwrap(), suite);
    }
}
