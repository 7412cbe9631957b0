//! Shared data types: identifiers, key codes, and terminal geometry.

pub mod ids;
pub mod key;
pub mod terminal;

pub use ids::{RunId, SessionId};
pub use key::{Key, SUPPORTED_KEYS};
pub use terminal::{EmulatedScreen, ScreenSnapshot, TerminalSize};
