// error.rs — Diagnostics for the policy language front end.
//
// Every compile failure is itemized: a stable code, a source location, and a
// human-readable message. Syntax errors stop the parse at the first problem;
// semantic errors are collected in full by the validator.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position in policy source text. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Byte offset from the start of the source.
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    /// The location of the first byte of a source text.
    pub const START: Location = Location {
        offset: 0,
        line: 1,
        column: 1,
    };
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Stable error codes reported to callers.
///
/// Serialized as the code string (e.g., `"DSL-E007"`) so API consumers can
/// match on it without depending on this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Structural error found by the lexer or parser.
    #[serde(rename = "DSL-P001")]
    Syntax,
    /// Execution primitive (e.g., `execute(...)`).
    #[serde(rename = "DSL-E001")]
    ExecutionPrimitive,
    /// Control-flow construct (e.g., `while`).
    #[serde(rename = "DSL-E002")]
    ControlFlow,
    /// Externally observable side effect (e.g., `call webhook(url)`).
    #[serde(rename = "DSL-E003")]
    SideEffect,
    /// Function or procedure definition.
    #[serde(rename = "DSL-E004")]
    FunctionDefinition,
    /// `version` metadata missing or invalid.
    #[serde(rename = "DSL-E005")]
    MissingVersion,
    /// `mode` metadata missing.
    #[serde(rename = "DSL-E006")]
    MissingMode,
    /// `block` used outside `mode ENFORCE`.
    #[serde(rename = "DSL-E007")]
    BlockOutsideEnforce,
    /// Recursive or self-referential metric definition.
    #[serde(rename = "DSL-E008")]
    SelfReference,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Syntax => "DSL-P001",
            ErrorCode::ExecutionPrimitive => "DSL-E001",
            ErrorCode::ControlFlow => "DSL-E002",
            ErrorCode::SideEffect => "DSL-E003",
            ErrorCode::FunctionDefinition => "DSL-E004",
            ErrorCode::MissingVersion => "DSL-E005",
            ErrorCode::MissingMode => "DSL-E006",
            ErrorCode::BlockOutsideEnforce => "DSL-E007",
            ErrorCode::SelfReference => "DSL-E008",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One itemized compile problem: `(code, location, message)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, location: Location, message: impl Into<String>) -> Self {
        Self {
            code,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.location, self.message)
    }
}

/// A syntax error from the lexer or parser. Terminal for the compile attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at {location}: {message}")]
pub struct SyntaxError {
    pub location: Location,
    pub message: String,
}

impl SyntaxError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(err: SyntaxError) -> Self {
        Diagnostic::new(ErrorCode::Syntax, err.location, err.message)
    }
}

/// The ordered list of diagnostics returned by a failed `compile()`.
///
/// Never empty: a compile either yields a `PolicyDefinition` or at least one
/// diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("policy rejected with {} error(s): {}", .diagnostics.len(), summarize(.diagnostics))]
pub struct CompileErrors {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileErrors {
    /// Build from diagnostics, sorting them by source position.
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by_key(|d| d.location.offset);
        Self { diagnostics }
    }

    /// Whether any diagnostic carries the given code.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    /// All codes in report order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }
}

impl From<SyntaxError> for CompileErrors {
    fn from(err: SyntaxError) -> Self {
        CompileErrors::new(vec![err.into()])
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
