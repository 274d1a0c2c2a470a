//! JSON codec for BX programs
//!
//! Every node is tagged with a `kind` discriminant. Construction checks run
//! while decoding, so a decoded program obeys the same rules as a parsed one.

use log::debug;

use crate::frontend::ast::Program;
use crate::utils::{Error, Result};

/// Decode a program. Unknown discriminants, missing fields and failed
/// construction checks all surface as malformed declarations.
pub fn decode_program(json: &str) -> Result<Program> {
    let program: Program = serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))?;
    debug!("decoded {} procedures", program.procedures.len());
    Ok(program)
}

/// Encode a program, including any resolved types, as pretty JSON
pub fn encode_program(program: &Program) -> Result<String> {
    serde_json::to_string_pretty(program).map_err(|e| Error::malformed(e.to_string()))
}
