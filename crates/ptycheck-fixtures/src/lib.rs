//! Fixture applications and helpers for ptycheck's end-to-end tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod catalog;
pub mod helpers;
pub mod menu;
