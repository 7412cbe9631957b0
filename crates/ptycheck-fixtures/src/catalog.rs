//! Canned library contents behind the menu app's `--cli` commands.
//!
//! The numbers are fixed so chained probes select a known id: the smallest
//! stable-to-lazer import is set 1002, which ties with 1003.

use clap::ValueEnum;
use serde_json::{json, Value};

/// Sync direction argument of `dry-run` and `sync`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// stable to lazer
    #[value(name = "s2l")]
    StableToLazer,
    /// lazer to stable
    #[value(name = "l2s")]
    LazerToStable,
    /// both ways
    #[value(name = "bi")]
    Bidirectional,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StableToLazer => "s2l",
            Self::LazerToStable => "l2s",
            Self::Bidirectional => "bi",
        }
    }
}

/// Planned action for one beatmap set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanItem {
    pub set_id: u64,
    pub title: &'static str,
    pub import: bool,
    pub size_bytes: u64,
}

impl PlanItem {
    fn to_json(self) -> Value {
        json!({
            "set_id": self.set_id,
            "title": self.title,
            "action": if self.import { "Import" } else { "Skip" },
            "size_bytes": self.size_bytes,
        })
    }
}

const fn item(set_id: u64, title: &'static str, import: bool, size_bytes: u64) -> PlanItem {
    PlanItem {
        set_id,
        title,
        import,
        size_bytes,
    }
}

const STABLE_TO_LAZER: &[PlanItem] = &[
    item(1001, "Camellia - Exit This Earth's Atomosphere", true, 5_200_000),
    item(1002, "xi - Blue Zenith", true, 1_048_576),
    item(1003, "DragonForce - Through the Fire and Flames", true, 1_048_576),
    item(1004, "Halozy - Genryuu Kaiko", false, 700_000),
];

const LAZER_TO_STABLE: &[PlanItem] = &[
    item(2001, "Kurokotei - Galaxy Collapse", true, 2_400_000),
    item(2002, "Team Grimoire - C18H27NO3", false, 3_100_000),
];

/// Items a dry run in `direction` would touch.
pub fn plan(direction: Direction) -> Vec<PlanItem> {
    match direction {
        Direction::StableToLazer => STABLE_TO_LAZER.to_vec(),
        Direction::LazerToStable => LAZER_TO_STABLE.to_vec(),
        Direction::Bidirectional => STABLE_TO_LAZER
            .iter()
            .chain(LAZER_TO_STABLE)
            .copied()
            .collect(),
    }
}

pub fn scan_report() -> Value {
    let sets = |items: &[PlanItem]| items.len();
    json!({
        "stable": { "path": "/fixtures/osu!", "beatmap_sets": sets(STABLE_TO_LAZER) },
        "lazer": { "path": "/fixtures/osu-lazer", "beatmap_sets": sets(LAZER_TO_STABLE) },
    })
}

pub fn dry_run_report(direction: Direction) -> Value {
    let items = plan(direction);
    let total_bytes: u64 = items
        .iter()
        .filter(|item| item.import)
        .map(|item| item.size_bytes)
        .sum();
    json!({
        "direction": direction.as_str(),
        "items": items.into_iter().map(PlanItem::to_json).collect::<Vec<_>>(),
        "total_bytes": total_bytes,
    })
}

/// Result of syncing `set_ids`. Ids not planned for import are skipped; with
/// `fail` every import fails.
pub fn sync_report(direction: Direction, set_ids: &[u64], fail: bool) -> Value {
    let importable = plan(direction);
    let (known, unknown): (Vec<u64>, Vec<u64>) = set_ids.iter().partition(|id| {
        importable
            .iter()
            .any(|item| item.import && item.set_id == **id)
    });
    let (imported, failed) = if fail {
        (0, known.len())
    } else {
        (known.len(), 0)
    };
    json!({
        "direction": direction.as_str(),
        "imported": imported,
        "skipped": unknown.len(),
        "failed": failed,
        "set_ids": set_ids,
    })
}
