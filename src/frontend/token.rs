//! Token definitions for BX

use crate::utils::Span;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn eof(span: Span) -> Self {
        Self { kind: TokenKind::Eof, span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    /// def
    Def,
    /// var
    Var,
    /// int
    Int,
    /// bool
    Bool,
    /// void
    Void,
    /// struct
    Struct,
    /// type
    Type,
    /// null
    Null,
    /// true
    True,
    /// false
    False,
    /// if
    If,
    /// else
    Else,
    /// while
    While,
    /// break
    Break,
    /// continue
    Continue,
    /// return
    Return,

    // ============ Identifiers and Literals ============
    /// Identifier (variable, procedure, field or alias name)
    Ident(String),
    /// Unsigned decimal literal; the sign is a separate token
    IntLit(i64),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Eq,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Caret,
    /// <<
    Shl,
    /// >>
    Shr,
    /// ~
    Tilde,
    /// ->
    Arrow,
    /// .
    Dot,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// :
    Colon,
    /// ;
    Semicolon,

    // ============ Special ============
    /// End of file
    Eof,
}

/// How operators of one precedence level group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    /// `a == b == c` is rejected instead of folded
    NonAssoc,
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "def" => Some(TokenKind::Def),
            "var" => Some(TokenKind::Var),
            "int" => Some(TokenKind::Int),
            "bool" => Some(TokenKind::Bool),
            "void" => Some(TokenKind::Void),
            "struct" => Some(TokenKind::Struct),
            "type" => Some(TokenKind::Type),
            "null" => Some(TokenKind::Null),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "return" => Some(TokenKind::Return),
            _ => None,
        }
    }

    /// Precedence and grouping of a binary operator, loosest = 1.
    /// Returns None if not a binary operator.
    pub fn binary_precedence(&self) -> Option<(u8, Assoc)> {
        match self {
            // Logical OR
            TokenKind::OrOr => Some((1, Assoc::Left)),

            // Logical AND
            TokenKind::AndAnd => Some((2, Assoc::Left)),

            // Bitwise OR
            TokenKind::Or => Some((3, Assoc::Left)),

            // Bitwise XOR
            TokenKind::Caret => Some((4, Assoc::Left)),

            // Bitwise AND
            TokenKind::And => Some((5, Assoc::Left)),

            // Equality
            TokenKind::EqEq | TokenKind::Ne => Some((6, Assoc::NonAssoc)),

            // Comparison
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some((7, Assoc::NonAssoc)),

            // Shift
            TokenKind::Shl | TokenKind::Shr => Some((8, Assoc::Left)),

            // Additive
            TokenKind::Plus | TokenKind::Minus => Some((9, Assoc::Left)),

            // Multiplicative (highest for binary)
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some((10, Assoc::Left)),

            _ => None,
        }
    }

    /// Source spelling, used in diagnostics
    pub fn describe(&self) -> String {
        let text = match self {
            TokenKind::Def => "def",
            TokenKind::Var => "var",
            TokenKind::Int => "int",
            TokenKind::Bool => "bool",
            TokenKind::Void => "void",
            TokenKind::Struct => "struct",
            TokenKind::Type => "type",
            TokenKind::Null => "null",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Ident(name) => return format!("identifier {}", name),
            TokenKind::IntLit(n) => return format!("number {}", n),
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Caret => "^",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::Tilde => "~",
            TokenKind::Arrow => "->",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Eof => return "end of input".to_string(),
        };
        format!("'{}'", text)
    }
}
