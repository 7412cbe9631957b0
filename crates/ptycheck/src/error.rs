//! Structured harness errors.
//!
//! Every fallible operation in the engine returns [`HarnessError`], which pairs a
//! stable [`ErrorCode`] with a human message and optional JSON context. Runners
//! convert these into [`ErrorInfo`] evidence on the affected test instead of
//! propagating them past the per-test boundary.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Result alias used throughout the engine.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Stable error codes with mapped process exit codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The application under test failed to start.
    #[serde(rename = "E_SPAWN")]
    Spawn,
    /// Writing to the application's input failed.
    #[serde(rename = "E_WRITE")]
    Write,
    /// The application went away mid-interaction.
    #[serde(rename = "E_UNEXPECTED_EXIT")]
    UnexpectedExit,
    /// A one-shot command exceeded its timeout.
    #[serde(rename = "E_PROBE_TIMEOUT")]
    ProbeTimeout,
    /// A harness lifetime budget was exceeded.
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    /// Structured output did not parse or lacked required fields.
    #[serde(rename = "E_SHAPE")]
    Shape,
    /// Other operating system I/O failure.
    #[serde(rename = "E_IO")]
    Io,
    /// Invalid suite, key name, or pattern.
    #[serde(rename = "E_CONFIG")]
    Config,
    /// A required environment capability is missing.
    #[serde(rename = "E_CAPABILITY")]
    Capability,
    /// Invalid command-line arguments.
    #[serde(rename = "E_CLI_INVALID_ARG")]
    CliInvalidArg,
    /// Internal invariant violation.
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    const ALL: [Self; 11] = [
        Self::Spawn,
        Self::Write,
        Self::UnexpectedExit,
        Self::ProbeTimeout,
        Self::Timeout,
        Self::Shape,
        Self::Io,
        Self::Config,
        Self::Capability,
        Self::CliInvalidArg,
        Self::Internal,
    ];

    /// Wire form of the code, e.g. `E_SPAWN`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "E_SPAWN",
            Self::Write => "E_WRITE",
            Self::UnexpectedExit => "E_UNEXPECTED_EXIT",
            Self::ProbeTimeout => "E_PROBE_TIMEOUT",
            Self::Timeout => "E_TIMEOUT",
            Self::Shape => "E_SHAPE",
            Self::Io => "E_IO",
            Self::Config => "E_CONFIG",
            Self::Capability => "E_CAPABILITY",
            Self::CliInvalidArg => "E_CLI_INVALID_ARG",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Parse the wire form back into a code.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code used when this error ends the harness.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Spawn => 3,
            Self::Write => 4,
            Self::UnexpectedExit => 5,
            Self::ProbeTimeout => 6,
            Self::Timeout => 7,
            Self::Shape => 8,
            Self::Io => 9,
            Self::Config => 10,
            Self::Capability => 11,
            Self::CliInvalidArg => 12,
            Self::Internal => 13,
        }
    }

    const fn help(self) -> Option<&'static str> {
        match self {
            Self::Spawn => {
                Some("check that the executable exists and the working directory is valid")
            }
            Self::Capability => {
                Some("pseudo-terminal support is often missing in minimal containers")
            }
            Self::Config => Some("run `ptycheck default-suite` for a valid starting point"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable form of a [`HarnessError`], attached to reports as evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Error raised by any harness component.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HarnessError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context (raw payloads, paths, limits).
    pub context: Option<Value>,
}

impl HarnessError {
    /// Build an error from its parts.
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        context: impl Into<Option<Value>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn spawn(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Spawn, message, context)
    }

    pub fn write(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Write, message, source_context(err))
    }

    pub fn unexpected_exit(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::UnexpectedExit, message, context)
    }

    pub fn probe_timeout(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::ProbeTimeout, message, context)
    }

    pub fn timeout(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Timeout, message, context)
    }

    pub fn shape(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Shape, message, context)
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Io, message, source_context(err))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message, None)
    }

    pub fn capability(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Capability, message, source_context(err))
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CliInvalidArg, message, None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, None)
    }

    /// Exit code for this error's code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Convert into the serializable evidence form.
    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code,
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl Diagnostic for HarnessError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.code
            .help()
            .map(|help| Box::new(help) as Box<dyn fmt::Display>)
    }
}

fn source_context(err: impl fmt::Display) -> Value {
    serde_json::json!({ "source": err.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_wire_form() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("E_NOPE"), None);
    }

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::ALL {
            assert!(code.exit_code() > 1);
            assert!(seen.insert(code.exit_code()));
        }
    }

    #[test]
    fn serializes_code_as_wire_string() {
        let err = HarnessError::shape("missing key", serde_json::json!({"raw": "{}"}));
        let info = serde_json::to_value(err.to_error_info()).unwrap();
        assert_eq!(info["code"], "E_SHAPE");
        assert_eq!(info["context"]["raw"], "{}");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = HarnessError::io("failed to read", "boom");
        assert_eq!(err.to_string(), "E_IO: failed to read");
        assert_eq!(err.context.unwrap()["source"], "boom");
    }
}
