//! ptycheck: behavioral verification for terminal applications.
//!
//! The harness drives an interactive full-screen program through a
//! pseudo-terminal, injects keystrokes with controlled timing, normalizes the
//! captured output into readable lines, and flags crash signatures. The same
//! program's non-interactive surface is exercised with one-shot probes whose
//! JSON output is checked for shape. Results from both feed a verdict
//! aggregator with an ordered, named outcome per test.
//!
//! Layers, leaf first: [`normalize`], [`buffer`], [`terminal`], [`session`],
//! [`detector`], [`scenario`], [`probe`], [`verdict`], [`suite`].

#![forbid(unsafe_code)]
// Public API types have docs; plain data fields are documented by their names.
#![allow(missing_docs)]

pub mod buffer;
pub mod detector;
pub mod error;
pub mod model;
pub mod normalize;
pub mod probe;
pub mod process;
pub mod scenario;
pub mod session;
pub mod suite;
pub mod terminal;
pub mod verdict;

pub use crate::error::{ErrorCode, ErrorInfo, HarnessError, HarnessResult};
