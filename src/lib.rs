//! BX front end
//!
//! Lexing, parsing, and scope/overload resolution for the BX teaching
//! language. The result of a successful run is a `Program` whose every
//! expression carries a concrete type.

pub mod feedback;
pub mod frontend;
pub mod types;
pub mod utils;

use std::fs;
use std::path::Path;

pub use frontend::ast::Program;
pub use utils::{Error, Result};

use frontend::parser::parse_source;
use frontend::semantic::resolve_program;

/// Parse and resolve a source text
pub fn compile(source: &str) -> Result<Program> {
    let mut program = parse_source(source)?;
    resolve_program(&mut program)?;
    Ok(program)
}

/// Read, parse and resolve a source file
pub fn compile_path(path: &Path) -> Result<Program> {
    let source = fs::read_to_string(path)?;
    compile(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_resolves_everything() {
        let program = compile("def main(): void { var x = 1, y = 2 : int; x = x + y; print_int(x); }").unwrap();
        assert!(program.is_fully_resolved());
    }

    #[test]
    fn test_compile_stops_at_first_error() {
        let err = compile("def main() { x = 1; y = 2; }").unwrap_err();
        assert!(matches!(err, Error::UndefinedSymbol { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = compile_path(Path::new("/nonexistent/bxc/input.bx")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.span(), None);
    }
}
