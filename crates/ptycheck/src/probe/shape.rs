//! Structural checks over probe output.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw payloads attached to shape errors are clipped to this many characters.
const RAW_CLIP_CHARS: usize = 2_000;

/// Parse `stdout` as a JSON object and require `required_keys` at the top level.
///
/// A key whose value is `null` counts as missing.
///
/// # Errors
/// `E_SHAPE` when the output is not JSON, not an object, or lacks a key.
pub fn validate_json_shape(
    stdout: &str,
    required_keys: &[String],
) -> HarnessResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|err| shape_error(format!("output is not valid JSON: {err}"), stdout))?;
    let Value::Object(object) = value else {
        return Err(shape_error("output is not a JSON object", stdout));
    };
    let missing: Vec<&String> = required_keys
        .iter()
        .filter(|key| object.get(key.as_str()).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(HarnessError::shape(
            format!("missing required keys: {missing:?}"),
            serde_json::json!({ "missing": missing, "raw": clip(stdout) }),
        ));
    }
    Ok(object)
}

/// Rules a JSON probe's output must satisfy. Paths are dot-separated
/// (`stable.beatmap_sets`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonExpect {
    /// Top-level keys that must be present and non-null.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_keys: Vec<String>,
    /// Paths that must hold non-negative integers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub counts: Vec<String>,
    /// Paths that must hold arrays with at least this many items.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub min_items: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item_rules: Vec<ItemRule>,
    /// Paths that must hold exactly these values.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub equals: BTreeMap<String, Value>,
    /// Accept output that is not JSON at all, as long as there is some.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub lenient: bool,
}

/// "Items of `array` whose `when_field` equals `when_equals` must have a
/// non-null `require`."
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemRule {
    pub array: String,
    pub when_field: String,
    pub when_equals: Value,
    pub require: String,
}

impl JsonExpect {
    /// Check `stdout` and return the parsed document.
    ///
    /// In lenient mode non-JSON output comes back as a JSON string.
    ///
    /// # Errors
    /// `E_SHAPE` naming the first rule that does not hold.
    pub fn check(&self, stdout: &str) -> HarnessResult<Value> {
        if self.lenient {
            return match serde_json::from_str::<Value>(stdout.trim()) {
                Ok(value) => Ok(value),
                Err(_) if !stdout.trim().is_empty() => Ok(Value::String(stdout.to_string())),
                Err(_) => Err(shape_error("no output", stdout)),
            };
        }

        let object = validate_json_shape(stdout, &self.required_keys)?;
        let document = Value::Object(object);
        self.check_document(&document)
            .map_err(|message| shape_error(message, stdout))?;
        Ok(document)
    }

    fn check_document(&self, document: &Value) -> Result<(), String> {
        for path in &self.counts {
            if lookup(document, path).and_then(Value::as_u64).is_none() {
                return Err(format!("'{path}' is not a non-negative integer"));
            }
        }
        for (path, min) in &self.min_items {
            match lookup(document, path).and_then(Value::as_array).map(Vec::len) {
                Some(len) if len >= *min => {}
                Some(len) => {
                    return Err(format!("'{path}' has {len} items, expected at least {min}"));
                }
                None => return Err(format!("'{path}' is not an array")),
            }
        }
        for rule in &self.item_rules {
            rule.check(document)?;
        }
        for (path, expected) in &self.equals {
            let actual = lookup(document, path);
            if actual != Some(expected) {
                return Err(format!("'{path}' is {}, expected {expected}", describe(actual)));
            }
        }
        Ok(())
    }
}

impl ItemRule {
    fn check(&self, document: &Value) -> Result<(), String> {
        let Some(items) = lookup(document, &self.array).and_then(Value::as_array) else {
            return Err(format!("'{}' is not an array", self.array));
        };
        let offending = items.iter().position(|item| {
            item.get(&self.when_field) == Some(&self.when_equals)
                && item.get(&self.require).map_or(true, Value::is_null)
        });
        match offending {
            Some(index) => Err(format!(
                "{}[{index}] has {} = {} but no '{}'",
                self.array, self.when_field, self.when_equals, self.require
            )),
            None => Ok(()),
        }
    }
}

/// Any-of checks over a probe's plain-text stdout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum StdoutCheck {
    /// At least this many characters.
    MinLen { chars: usize },
    /// Contains the text, case-insensitively.
    Contains { text: String },
}

impl StdoutCheck {
    pub fn matches(&self, stdout: &str) -> bool {
        match self {
            Self::MinLen { chars } => stdout.chars().count() >= *chars,
            Self::Contains { text } => stdout.to_lowercase().contains(&text.to_lowercase()),
        }
    }

    /// True when `checks` is empty or any one of them matches.
    pub fn any(checks: &[Self], stdout: &str) -> bool {
        checks.is_empty() || checks.iter().any(|check| check.matches(stdout))
    }
}

/// Resolve a dot-separated path into `value`.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "missing".to_string(), Value::to_string)
}

pub(crate) fn clip(raw: &str) -> String {
    raw.chars().take(RAW_CLIP_CHARS).collect()
}

fn shape_error(message: impl Into<String>, raw: &str) -> HarnessError {
    HarnessError::shape(message, serde_json::json!({ "raw": clip(raw) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    const DRY_RUN: &str = r#"{
        "summary": {"total": 3, "import": 2, "skip": 1, "duplicate": 0},
        "items": [
            {"set_id": 1001, "action": "Import", "size_bytes": 5200000},
            {"set_id": null, "action": "Skip"},
            {"set_id": 1002, "action": "Import", "size_bytes": 1048576}
        ]
    }"#;

    #[test]
    fn required_keys_must_be_present_and_non_null() {
        let keys = vec!["stable".to_string(), "lazer".to_string()];
        let ok = r#"{"stable": {"beatmap_sets": 3}, "lazer": {"beatmap_sets": 0}}"#;
        assert!(validate_json_shape(ok, &keys).is_ok());

        let err = validate_json_shape(r#"{"stable": {}, "lazer": null}"#, &keys).unwrap_err();
        assert_eq!(err.code, ErrorCode::Shape);
        assert_eq!(err.context.unwrap()["missing"], json!(["lazer"]));
    }

    #[test]
    fn non_json_and_non_object_are_shape_errors() {
        for raw in ["not json", "[1, 2]", ""] {
            let err = validate_json_shape(raw, &[]).unwrap_err();
            assert_eq!(err.code, ErrorCode::Shape, "{raw}");
        }
    }

    #[test]
    fn raw_payload_is_clipped() {
        let raw = "x".repeat(RAW_CLIP_CHARS * 2);
        let err = validate_json_shape(&raw, &[]).unwrap_err();
        let context = err.context.unwrap();
        assert_eq!(context["raw"].as_str().unwrap().len(), RAW_CLIP_CHARS);
    }

    #[test]
    fn dry_run_rules_hold() {
        let expect = JsonExpect {
            required_keys: vec!["items".to_string()],
            counts: vec!["summary.total".to_string()],
            min_items: BTreeMap::from([("items".to_string(), 1)]),
            item_rules: vec![ItemRule {
                array: "items".to_string(),
                when_field: "action".to_string(),
                when_equals: json!("Import"),
                require: "set_id".to_string(),
            }],
            ..JsonExpect::default()
        };
        expect.check(DRY_RUN).unwrap();

        let broken = DRY_RUN.replace("\"set_id\": 1002", "\"set_id\": null");
        let err = expect.check(&broken).unwrap_err();
        assert!(err.message.contains("items[2]"), "{}", err.message);
    }

    #[test]
    fn counts_reject_negative_values() {
        let expect = JsonExpect {
            counts: vec!["stable.beatmap_sets".to_string()],
            ..JsonExpect::default()
        };
        assert!(expect.check(r#"{"stable": {"beatmap_sets": 4}}"#).is_ok());
        assert!(expect.check(r#"{"stable": {"beatmap_sets": -1}}"#).is_err());
        assert!(expect.check(r#"{"stable": {}}"#).is_err());
    }

    #[test]
    fn equals_compares_values() {
        let expect = JsonExpect {
            equals: BTreeMap::from([("failed".to_string(), json!(0))]),
            ..JsonExpect::default()
        };
        assert!(expect.check(r#"{"imported": 1, "failed": 0}"#).is_ok());
        let err = expect.check(r#"{"imported": 0, "failed": 2}"#).unwrap_err();
        assert!(err.message.contains("'failed' is 2"));
        let err = expect.check(r#"{"imported": 0}"#).unwrap_err();
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn lenient_accepts_any_non_empty_output() {
        let expect = JsonExpect {
            lenient: true,
            ..JsonExpect::default()
        };
        assert_eq!(expect.check(r#"{"state": "menu"}"#).unwrap()["state"], "menu");
        assert_eq!(expect.check("plain text").unwrap(), json!("plain text"));
        assert_eq!(expect.check("  \n").unwrap_err().code, ErrorCode::Shape);
    }

    #[test]
    fn stdout_checks_are_any_of() {
        let checks = vec![
            StdoutCheck::MinLen { chars: 100 },
            StdoutCheck::Contains {
                text: "osu-sync".to_string(),
            },
        ];
        assert!(StdoutCheck::any(&checks, "Welcome to OSU-SYNC"));
        assert!(StdoutCheck::any(&checks, &"x".repeat(100)));
        assert!(!StdoutCheck::any(&checks, "short"));
        assert!(StdoutCheck::any(&[], ""));
    }

    #[test]
    fn lookup_walks_nested_objects() {
        let value = json!({"a": {"b": {"c": 1}}});
        assert_eq!(lookup(&value, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup(&value, "a.x"), None);
    }
}
