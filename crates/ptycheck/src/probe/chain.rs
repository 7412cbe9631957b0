//! Picking an id from one probe's output for the next probe.

use super::shape::lookup;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder replaced with the selected id in a chained probe's arguments.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Which array items are candidates, and which one wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSelect {
    /// Path of the candidate array (`items`).
    pub array: String,
    /// Only items whose field equals the value are candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_field: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub equals: Value,
    /// Field holding the id; candidates without one are ignored.
    pub id_field: String,
    /// Numeric field minimized over the candidates.
    pub min_by: String,
}

/// The id of the candidate with the smallest `min_by` value.
///
/// Items with a missing or non-numeric size sort after every sized item, and
/// on a tie the first candidate wins. `None` when nothing qualifies.
pub fn select_min_by(document: &Value, select: &ChainSelect) -> Option<Value> {
    let items = lookup(document, &select.array)?.as_array()?;
    let mut best: Option<(f64, &Value)> = None;
    for item in items {
        if let Some(field) = &select.where_field {
            if item.get(field) != Some(&select.equals) {
                continue;
            }
        }
        let Some(id) = item.get(&select.id_field).filter(|id| !id.is_null()) else {
            continue;
        };
        let size = item
            .get(&select.min_by)
            .and_then(Value::as_f64)
            .unwrap_or(f64::INFINITY);
        if best.map_or(true, |(best_size, _)| size < best_size) {
            best = Some((size, id));
        }
    }
    best.map(|(_, id)| id.clone())
}

/// Replace [`ID_PLACEHOLDER`] in every argument with `id`.
///
/// String ids are inserted without quotes.
pub fn substitute_id(args: &[String], id: &Value) -> Vec<String> {
    let id = match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    args.iter()
        .map(|arg| arg.replace(ID_PLACEHOLDER, &id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imports() -> ChainSelect {
        ChainSelect {
            array: "items".to_string(),
            where_field: Some("action".to_string()),
            equals: json!("Import"),
            id_field: "set_id".to_string(),
            min_by: "size_bytes".to_string(),
        }
    }

    #[test]
    fn picks_smallest_import_and_keeps_first_on_tie() {
        let document = json!({"items": [
            {"set_id": 1001, "action": "Import", "size_bytes": 5_200_000},
            {"set_id": 1002, "action": "Import", "size_bytes": 1_048_576},
            {"set_id": 1003, "action": "Import", "size_bytes": 1_048_576},
            {"set_id": 9, "action": "Skip", "size_bytes": 1}
        ]});
        assert_eq!(select_min_by(&document, &imports()), Some(json!(1002)));
    }

    #[test]
    fn missing_sizes_sort_last_and_null_ids_are_ignored() {
        let document = json!({"items": [
            {"set_id": 7, "action": "Import"},
            {"set_id": null, "action": "Import", "size_bytes": 1},
            {"set_id": 8, "action": "Import", "size_bytes": 900}
        ]});
        assert_eq!(select_min_by(&document, &imports()), Some(json!(8)));

        let unsized_only = json!({"items": [
            {"set_id": 7, "action": "Import"},
            {"set_id": 8, "action": "Import"}
        ]});
        assert_eq!(select_min_by(&unsized_only, &imports()), Some(json!(7)));
    }

    #[test]
    fn no_candidate_yields_none() {
        assert_eq!(select_min_by(&json!({"items": []}), &imports()), None);
        assert_eq!(select_min_by(&json!({"other": 1}), &imports()), None);
        let skips = json!({"items": [{"set_id": 1, "action": "Skip"}]});
        assert_eq!(select_min_by(&skips, &imports()), None);
    }

    #[test]
    fn substitutes_placeholder() {
        let args: Vec<String> = ["sync", "s2l", "--set-ids", "{id}", "--json"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let substituted = substitute_id(&args, &json!(1002));
        assert_eq!(substituted[3], "1002");
        assert_eq!(substitute_id(&args, &json!("abc"))[3], "abc");
    }
}
