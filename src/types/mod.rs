//! Type system

mod type_system;

pub use type_system::{format_types, ProcSignature, StructField, Type};
