//! Frontend module - Lexer, Parser, Scopes, Resolution

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod scope;
pub mod semantic;
pub mod decode;
