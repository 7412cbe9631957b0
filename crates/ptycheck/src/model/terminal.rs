use serde::{Deserialize, Serialize};

/// PTY geometry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Linearized view of the most recent output: the last `window_chars`
/// characters of a session buffer run through the normalizer.
///
/// Recomputed on demand; never stored by the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSnapshot {
    /// Size of the raw window the lines were derived from.
    pub window_chars: usize,
    /// Normalized, non-empty lines in output order.
    pub lines: Vec<String>,
}

impl ScreenSnapshot {
    /// Case-insensitive substring search across all lines.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.lines
            .iter()
            .any(|line| line.to_lowercase().contains(&needle))
    }

    /// The last `count` lines, each clipped to `max_width` characters.
    #[must_use]
    pub fn evidence(&self, count: usize, max_width: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines
            .iter()
            .skip(skip)
            .map(|line| line.chars().take(max_width).collect())
            .collect()
    }
}

/// Grid state from the vt100 emulator, kept alongside the linearized snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedScreen {
    pub rows: u16,
    pub cols: u16,
    pub cursor_row: u16,
    pub cursor_col: u16,
    pub cursor_visible: bool,
    pub alternate_screen: bool,
    /// One entry per grid row, trailing blanks trimmed.
    pub lines: Vec<String>,
}

impl EmulatedScreen {
    /// Whether any grid row contains `needle` (case-sensitive).
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_keeps_last_lines_clipped() {
        let snapshot = ScreenSnapshot {
            window_chars: 100,
            lines: vec!["first".into(), "second line".into(), "third line".into()],
        };
        assert_eq!(snapshot.evidence(2, 6), vec!["second", "third "]);
        assert_eq!(snapshot.evidence(10, 100).len(), 3);
    }

    #[test]
    fn contains_ignores_case() {
        let snapshot = ScreenSnapshot {
            window_chars: 10,
            lines: vec!["Main Menu".into()],
        };
        assert!(snapshot.contains("main menu"));
        assert!(!snapshot.contains("settings"));
    }
}
