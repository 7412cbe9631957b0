//! Crash signature detection over recent output.
//!
//! A heuristic scan, not a parser: each check looks only at a bounded tail of
//! the buffer, so a crash message that scrolls out of the tail before the next
//! check is missed.

use crate::error::{HarnessError, HarnessResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default tail window scanned by each check, in characters.
pub const DEFAULT_TAIL_CHARS: usize = 5_000;

/// Substrings that indicate a crash, matched case-insensitively.
pub const DEFAULT_INDICATORS: &[&str] = &["panic"];

/// Patterns that indicate a crash, compiled case-insensitively.
pub const DEFAULT_PATTERNS: &[&str] = &[r"thread\s+'[^']*'\s+panicked"];

const EXCERPT_RADIUS: usize = 80;

/// A recorded crash indicator match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignature {
    /// Label of the step (or phase) whose output tripped the detector.
    pub context: String,
    /// The indicator or pattern that matched.
    pub indicator: String,
    /// Text surrounding the match, for diagnosis.
    pub excerpt: String,
}

/// Detector settings, as they appear in suite files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    pub tail_chars: usize,
    pub indicators: Vec<String>,
    pub patterns: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tail_chars: DEFAULT_TAIL_CHARS,
            indicators: DEFAULT_INDICATORS.iter().map(|s| (*s).to_string()).collect(),
            patterns: DEFAULT_PATTERNS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Scans output tails for crash indicators and keeps every match it finds.
///
/// The recorded list only grows for the detector's lifetime.
#[derive(Debug)]
pub struct FailureDetector {
    tail_chars: usize,
    /// Regex patterns first, then escaped substring indicators, each with its label.
    patterns: Vec<(String, Regex)>,
    failures: Vec<FailureSignature>,
}

impl Default for FailureDetector {
    fn default() -> Self {
        // the built-in patterns always compile
        Self::new(&DetectorConfig::default()).unwrap_or_else(|_| Self {
            tail_chars: DEFAULT_TAIL_CHARS,
            patterns: Vec::new(),
            failures: Vec::new(),
        })
    }
}

impl FailureDetector {
    /// Build a detector from suite settings.
    ///
    /// # Errors
    /// `E_CONFIG` if a pattern does not compile or nothing would ever match.
    pub fn new(config: &DetectorConfig) -> HarnessResult<Self> {
        if config.indicators.is_empty() && config.patterns.is_empty() {
            return Err(HarnessError::config(
                "detector needs at least one indicator or pattern",
            ));
        }
        let mut patterns = Vec::with_capacity(config.patterns.len() + config.indicators.len());
        for pattern in &config.patterns {
            patterns.push((pattern.clone(), compile(pattern)?));
        }
        for indicator in &config.indicators {
            patterns.push((indicator.clone(), compile(&regex::escape(indicator))?));
        }
        Ok(Self {
            tail_chars: config.tail_chars.max(1),
            patterns,
            failures: Vec::new(),
        })
    }

    /// Window the caller should pass to [`FailureDetector::check`].
    pub fn tail_chars(&self) -> usize {
        self.tail_chars
    }

    /// Scan `buffer_tail` and record a signature tagged with `context` on match.
    ///
    /// Only the last `tail_chars` characters are inspected, whatever the caller passes.
    pub fn check(&mut self, buffer_tail: &str, context: &str) -> bool {
        let window = last_chars(buffer_tail, self.tail_chars);
        let Some((indicator, start, end)) = self.find(window) else {
            return false;
        };
        let signature = FailureSignature {
            context: context.to_string(),
            indicator,
            excerpt: excerpt(window, start, end),
        };
        warn!(
            context = %signature.context,
            indicator = %signature.indicator,
            "failure signature detected"
        );
        self.failures.push(signature);
        true
    }

    /// Everything recorded so far, in detection order.
    pub fn failures(&self) -> &[FailureSignature] {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn find(&self, window: &str) -> Option<(String, usize, usize)> {
        self.patterns.iter().find_map(|(label, regex)| {
            regex
                .find(window)
                .map(|found| (label.clone(), found.start(), found.end()))
        })
    }
}

fn compile(pattern: &str) -> HarnessResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| {
            HarnessError::new(
                crate::error::ErrorCode::Config,
                format!("invalid detector pattern '{pattern}'"),
                serde_json::json!({ "pattern": pattern, "source": err.to_string() }),
            )
        })
}

fn last_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    let skip = byte_offset(text, total - n);
    text.get(skip..).unwrap_or(text)
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(idx, _)| idx)
}

fn excerpt(window: &str, start: usize, end: usize) -> String {
    let before = window.get(..start).unwrap_or_default();
    let after = window.get(end..).unwrap_or_default();
    let head: String = {
        let chars: Vec<char> = before.chars().rev().take(EXCERPT_RADIUS).collect();
        chars.into_iter().rev().collect()
    };
    let tail: String = after.chars().take(EXCERPT_RADIUS).collect();
    let matched = window.get(start..end).unwrap_or_default();
    crate::normalize::normalize_to_text(&format!("{head}{matched}{tail}"))
}
