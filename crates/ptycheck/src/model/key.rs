use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named keys accepted in suite files. Single characters and `Ctrl+<letter>` are also accepted.
pub const SUPPORTED_KEYS: &[&str] = &[
    "Enter",
    "Up",
    "Down",
    "Left",
    "Right",
    "Tab",
    "Escape",
    "Backspace",
    "Delete",
    "Home",
    "End",
    "PageUp",
    "PageDown",
];

/// A keystroke the harness can inject into a session.
///
/// Serialized as its name (`"Enter"`, `"Down"`, `"r"`, `"Ctrl+c"`).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    Enter,
    Up,
    Down,
    Left,
    Right,
    Tab,
    Escape,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    /// A control chord such as `Ctrl+c`; holds the lowercase ASCII letter.
    Ctrl(char),
    /// A literal character.
    Char(char),
}

impl Key {
    /// Bytes written to the PTY for this key.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Enter => vec![b'\r'],
            Self::Up => b"\x1b[A".to_vec(),
            Self::Down => b"\x1b[B".to_vec(),
            Self::Right => b"\x1b[C".to_vec(),
            Self::Left => b"\x1b[D".to_vec(),
            Self::Tab => vec![b'\t'],
            Self::Escape => vec![0x1b],
            Self::Backspace => vec![0x7f],
            Self::Delete => b"\x1b[3~".to_vec(),
            Self::Home => b"\x1b[H".to_vec(),
            Self::End => b"\x1b[F".to_vec(),
            Self::PageUp => b"\x1b[5~".to_vec(),
            Self::PageDown => b"\x1b[6~".to_vec(),
            Self::Ctrl(letter) => vec![u8::try_from(letter).map_or(0, |byte| byte & 0x1f)],
            Self::Char(ch) => {
                let mut buf = [0u8; 4];
                ch.encode_utf8(&mut buf).as_bytes().to_vec()
            }
        }
    }
}

impl FromStr for Key {
    type Err = HarnessError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let key = match name {
            "Enter" => Self::Enter,
            "Up" => Self::Up,
            "Down" => Self::Down,
            "Left" => Self::Left,
            "Right" => Self::Right,
            "Tab" => Self::Tab,
            "Escape" | "Esc" => Self::Escape,
            "Backspace" => Self::Backspace,
            "Delete" => Self::Delete,
            "Home" => Self::Home,
            "End" => Self::End,
            "PageUp" => Self::PageUp,
            "PageDown" => Self::PageDown,
            _ => return parse_chord_or_char(name),
        };
        Ok(key)
    }
}

fn parse_chord_or_char(name: &str) -> Result<Key, HarnessError> {
    if let Some(rest) = name.strip_prefix("Ctrl+") {
        let mut chars = rest.chars();
        if let (Some(letter), None) = (chars.next(), chars.next()) {
            if letter.is_ascii_alphabetic() {
                return Ok(Key::Ctrl(letter.to_ascii_lowercase()));
            }
        }
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(Key::Char(ch)),
        _ => Err(HarnessError::new(
            crate::error::ErrorCode::Config,
            format!("unsupported key '{name}'"),
            serde_json::json!({
                "received_key": name,
                "supported_keys": SUPPORTED_KEYS,
                "note": "single characters and Ctrl+<letter> are also supported",
            }),
        )),
    }
}

impl TryFrom<String> for Key {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ctrl(letter) => write!(f, "Ctrl+{letter}"),
            Self::Char(ch) => write!(f, "{ch}"),
            named => write!(f, "{named:?}"),
        }
    }
}
