//! Escape and glyph normalization.
//!
//! Turns raw terminal output into an approximation of the visible text: control
//! sequences are removed, cursor-addressing sequences become line breaks so that
//! full-screen repaints linearize into rows, box-drawing borders are blanked, and
//! short noise lines are dropped. The transform is pure and idempotent over its own
//! joined output.

use std::iter::Peekable;
use std::str::Chars;

/// Lines shorter than this (in characters, after collapsing) are dropped.
pub const MIN_LINE_CHARS: usize = 3;

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// Normalize raw terminal output into ordered, non-empty text lines.
#[must_use]
pub fn normalize(raw: &str) -> Vec<String> {
    strip_escapes(raw)
        .split('\n')
        .filter_map(collapse_line)
        .collect()
}

/// [`normalize`], joined back into a single newline-separated string.
#[must_use]
pub fn normalize_to_text(raw: &str) -> String {
    normalize(raw).join("\n")
}

/// Remove escape sequences, blank out control characters and box-drawing glyphs.
///
/// Newlines are preserved; cursor-positioning and erase-display sequences are
/// replaced by a newline, and horizontal cursor moves by a space.
#[must_use]
pub fn strip_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ESC => {
                if let Some(replacement) = skip_escape(&mut chars) {
                    out.push(replacement);
                }
            }
            BEL => {}
            '\n' => out.push('\n'),
            c if c.is_control() || is_box_drawing(c) => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Consume one escape sequence (the leading ESC already taken) and return the
/// character that should stand in for it, if any.
fn skip_escape(chars: &mut Peekable<Chars<'_>>) -> Option<char> {
    match chars.peek().copied()? {
        '[' => {
            chars.next();
            skip_csi(chars)
        }
        ']' => {
            chars.next();
            skip_string(chars, true);
            None
        }
        'P' | 'X' | '^' | '_' => {
            chars.next();
            skip_string(chars, false);
            None
        }
        c if ('\x20'..='\x2f').contains(&c) => {
            // charset designation and similar: intermediates then one final
            while chars.next_if(|c| ('\x20'..='\x2f').contains(c)).is_some() {}
            chars.next();
            None
        }
        '\n' => None,
        _ => {
            chars.next();
            None
        }
    }
}

fn skip_csi(chars: &mut Peekable<Chars<'_>>) -> Option<char> {
    while chars.next_if(|c| ('\x20'..='\x3f').contains(c)).is_some() {}
    let final_byte = chars.next_if(|c| ('\x40'..='\x7e').contains(c))?;
    match final_byte {
        'H' | 'f' | 'A' | 'B' | 'E' | 'F' | 'd' | 'J' => Some('\n'),
        // horizontal moves skip over blank cells
        'C' | 'G' => Some(' '),
        _ => None,
    }
}

/// Skip an OSC/DCS-style string up to its terminator (ST, or BEL when allowed).
fn skip_string(chars: &mut Peekable<Chars<'_>>, bel_terminates: bool) {
    while let Some(c) = chars.next() {
        if c == BEL && bel_terminates {
            return;
        }
        if c == ESC {
            chars.next_if_eq(&'\\');
            return;
        }
    }
}

fn is_box_drawing(c: char) -> bool {
    ('\u{2500}'..='\u{257f}').contains(&c)
}

fn collapse_line(line: &str) -> Option<String> {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    (collapsed.chars().count() >= MIN_LINE_CHARS).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_sgr_and_cursor_visibility() {
        let raw = "\x1b[?25l\x1b[1;32mScan Installations\x1b[0m\x1b[?25h";
        assert_eq!(normalize(raw), vec!["Scan Installations"]);
    }

    #[test]
    fn cursor_addressing_splits_rows() {
        let raw = "\x1b[2J\x1b[1;1HMain Menu\x1b[3;5H▶ Sync Beatmaps\x1b[4;5H  Statistics";
        assert_eq!(
            normalize(raw),
            vec!["Main Menu", "▶ Sync Beatmaps", "Statistics"]
        );
    }

    #[test]
    fn horizontal_cursor_moves_separate_words() {
        assert_eq!(normalize("Sync\x1b[1CBeatmaps"), vec!["Sync Beatmaps"]);
        assert_eq!(normalize("Backup\x1b[12GRestore"), vec!["Backup Restore"]);
        assert_eq!(normalize("\x1b[5CIndented"), vec!["Indented"]);
    }

    #[test]
    fn strips_osc_dcs_and_charset_sequences() {
        let raw = "\x1b]0;window title\x07\x1bPq#0;2\x1b\\\x1b(Bvisible text\x1b]8;;http://x\x1b\\";
        assert_eq!(normalize(raw), vec!["visible text"]);
    }

    #[test]
    fn box_drawing_is_blanked_but_content_kept() {
        let raw = "┌──────────┐\n│ Settings │\n└──────────┘";
        assert_eq!(normalize(raw), vec!["Settings"]);
    }

    #[test]
    fn short_and_blank_lines_are_dropped() {
        let raw = "ok\n  \n\tabc  def\r\nxy";
        assert_eq!(normalize(raw), vec!["abc def"]);
    }

    #[test]
    fn truncated_sequences_do_not_panic() {
        assert!(normalize("\x1b").is_empty());
        assert!(normalize("\x1b[12;").is_empty());
        assert_eq!(normalize("hello\x1b]unterminated title"), vec!["hello"]);
    }

    #[test]
    fn malformed_csi_keeps_following_text() {
        assert_eq!(normalize("\x1b[12\nnext line"), vec!["next line"]);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "(\\PC|\x1b|\x07|\r|\n|\\[|;|[0-9]|[─│┌┐]){0,200}") {
            let once = normalize(&raw);
            let twice = normalize(&once.join("\n"));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn escape_free_lines_survive(lines in prop::collection::vec("[ -~]{0,40}", 0..20)) {
            let raw = lines.join("\n");
            let expected: Vec<String> = lines
                .iter()
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|line| line.chars().count() >= MIN_LINE_CHARS)
                .collect();
            prop_assert_eq!(normalize(&raw), expected);
        }
    }
}
