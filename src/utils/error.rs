//! Error handling for the BX front end

use crate::utils::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
///
/// Every error is fatal for the compilation unit: the first one raised aborts
/// lexing, parsing or resolution and is handed back to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Lexer Errors ====================

    #[error("line {}: illegal character '{ch}'", .span.line)]
    IllegalCharacter {
        ch: char,
        /// The full text of the offending line, for caret rendering
        line_text: String,
        span: Span,
    },

    #[error("line {}: number {literal} is out of range", .span.line)]
    ValueOutOfRange { literal: String, span: Span },

    // ==================== Parser Errors ====================

    #[error("line {}: syntax error: expected {expected}, got {got}", .span.line)]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("line {}: syntax error: unexpected end of input, expected {expected}", .span.line)]
    UnexpectedEof { expected: String, span: Span },

    #[error("line {}: syntax error: {message}", .span.line)]
    Syntax { message: String, span: Span },

    #[error("line {}: malformed declaration: {message}", .span.line)]
    MalformedDeclaration { message: String, span: Span },

    // ==================== Semantic Errors ====================

    #[error("line {}: symbol {name} already defined in this scope", .span.line)]
    DuplicateSymbol { name: String, span: Span },

    #[error("line {}: procedure {name}({params}) is already defined", .span.line)]
    DuplicateProcedure {
        name: String,
        params: String,
        span: Span,
    },

    #[error("line {}: symbol {name} not defined", .span.line)]
    UndefinedSymbol { name: String, span: Span },

    #[error("line {}: no overload of {name} accepts ({args})", .span.line)]
    CallMismatch {
        name: String,
        args: String,
        span: Span,
    },

    #[error("line {}: type mismatch: expected {expected}, got {got}", .span.line)]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("line {}: type {ty} has no field {field}", .span.line)]
    UnknownField {
        field: String,
        ty: String,
        span: Span,
    },

    #[error("line {}: {jump} outside of a loop", .span.line)]
    JumpOutsideLoop { jump: String, span: Span },

    #[error("line {}: temporary for symbol {name} is already set", .span.line)]
    TemporaryAlreadyBound { name: String, span: Span },

    #[error("line {}: temporary for symbol {name} is not set", .span.line)]
    TemporaryUnbound { name: String, span: Span },

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Get the span associated with this error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::IllegalCharacter { span, .. } => Some(*span),
            Self::ValueOutOfRange { span, .. } => Some(*span),
            Self::UnexpectedToken { span, .. } => Some(*span),
            Self::UnexpectedEof { span, .. } => Some(*span),
            Self::Syntax { span, .. } => Some(*span),
            Self::MalformedDeclaration { span, .. } => Some(*span),
            Self::DuplicateSymbol { span, .. } => Some(*span),
            Self::DuplicateProcedure { span, .. } => Some(*span),
            Self::UndefinedSymbol { span, .. } => Some(*span),
            Self::CallMismatch { span, .. } => Some(*span),
            Self::TypeMismatch { span, .. } => Some(*span),
            Self::UnknownField { span, .. } => Some(*span),
            Self::JumpOutsideLoop { span, .. } => Some(*span),
            Self::TemporaryAlreadyBound { span, .. } => Some(*span),
            Self::TemporaryUnbound { span, .. } => Some(*span),
            Self::Io(_) => None,
        }
    }

    /// Shorthand for a malformed declaration without a source position,
    /// as raised by the AST decoder
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDeclaration {
            message: message.into(),
            span: Span::dummy(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_cites_line() {
        let err = Error::UndefinedSymbol {
            name: "y".to_string(),
            span: Span::new(0, 1, 7, 3),
        };
        assert_eq!(err.to_string(), "line 7: symbol y not defined");
        assert_eq!(err.span().map(|s| s.line), Some(7));
    }

    #[test]
    fn test_io_has_no_span() {
        assert_eq!(Error::Io("gone".to_string()).span(), None);
    }
}
