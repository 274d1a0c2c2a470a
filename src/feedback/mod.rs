//! Structured Feedback Module
//!
//! Turns a compiler error into either:
//! - a caret-annotated text block for terminals
//! - a JSON error report for tools

use serde::{Deserialize, Serialize};

use crate::utils::Error;

// ==================== Structured Error Report ====================

/// A structured error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code (e.g., "E0103")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Location information, absent for errors without a source position
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Text of the offending line
    pub line_text: Option<String>,
}

impl ErrorReport {
    /// Create an error report from a compiler error. `source` supplies the
    /// line text when the error does not carry it.
    pub fn from_error(error: &Error, file_name: &str, source: Option<&str>) -> Self {
        let location = error.span().filter(|s| s.line > 0).map(|s| Location {
            file: file_name.to_string(),
            line: s.line,
            column: s.column,
            line_text: line_text(error, source, s.line),
        });

        Self {
            code: error_code(error).to_string(),
            message: error.to_string(),
            location,
        }
    }

    /// Output as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Render for a terminal: `file:line:column: message`, then the line
    /// with a caret under the column
    pub fn render(&self) -> String {
        let Some(location) = &self.location else {
            return format!("error[{}]: {}", self.code, self.message);
        };

        let mut out = format!(
            "{}:{}:{}: error[{}]: {}",
            location.file, location.line, location.column, self.code, self.message
        );
        if let Some(text) = &location.line_text {
            let pad = " ".repeat(location.column.saturating_sub(1) as usize);
            out.push_str(&format!("\n    {}\n    {}^", text, pad));
        }
        out
    }
}

fn line_text(error: &Error, source: Option<&str>, line: u32) -> Option<String> {
    if let Error::IllegalCharacter { line_text, .. } = error {
        return Some(line_text.clone());
    }
    source?
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .map(str::to_string)
}

/// Stable code per error kind. Lexing and parsing use E00xx, resolution
/// E01xx, lowering-stage temporaries E02xx.
pub fn error_code(error: &Error) -> &'static str {
    match error {
        Error::IllegalCharacter { .. } => "E0001",
        Error::ValueOutOfRange { .. } => "E0002",
        Error::UnexpectedToken { .. } => "E0003",
        Error::UnexpectedEof { .. } => "E0004",
        Error::Syntax { .. } => "E0005",
        Error::MalformedDeclaration { .. } => "E0006",
        Error::DuplicateSymbol { .. } => "E0101",
        Error::DuplicateProcedure { .. } => "E0102",
        Error::UndefinedSymbol { .. } => "E0103",
        Error::CallMismatch { .. } => "E0104",
        Error::TypeMismatch { .. } => "E0105",
        Error::UnknownField { .. } => "E0106",
        Error::JumpOutsideLoop { .. } => "E0107",
        Error::TemporaryAlreadyBound { .. } => "E0201",
        Error::TemporaryUnbound { .. } => "E0202",
        Error::Io(_) => "E0900",
    }
}
