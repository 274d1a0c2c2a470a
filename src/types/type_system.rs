//! Type System for BX
//!
//! The type union is closed. Equality and hashing are structural: two types
//! are equal when their shapes match recursively, and equal types always hash
//! equal, so `Type` and `ProcSignature` can key hash maps directly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named, ordered struct field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A BX type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Int,
    Bool,
    Void,
    /// Type of the `null` literal
    Null,
    Pointer { target: Box<Type> },
    Array { length: u32, element: Box<Type> },
    /// Field names are not checked for uniqueness here
    Struct { fields: Vec<StructField> },
    /// Placeholder written by the parser, replaced during resolution
    Unresolved,
}

impl Default for Type {
    /// A fresh `Unresolved`; every call builds an independent value
    fn default() -> Self {
        Type::Unresolved
    }
}

impl Type {
    /// Wrap `target` in a pointer
    pub fn pointer(target: Type) -> Self {
        Type::Pointer { target: Box::new(target) }
    }

    /// Wrap `element` in a fixed-length array
    pub fn array(length: u32, element: Type) -> Self {
        Type::Array { length, element: Box::new(element) }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    /// True when no `Unresolved` appears anywhere inside this type
    pub fn is_resolved(&self) -> bool {
        match self {
            Type::Int | Type::Bool | Type::Void | Type::Null => true,
            Type::Pointer { target } => target.is_resolved(),
            Type::Array { element, .. } => element.is_resolved(),
            Type::Struct { fields } => fields.iter().all(|f| f.ty.is_resolved()),
            Type::Unresolved => false,
        }
    }

    /// Look up a struct field by name (first match wins)
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Struct { fields } => fields.iter().find(|f| f.name == name).map(|f| &f.ty),
            _ => None,
        }
    }

    /// Whether a value of type `value` may be stored where `self` is expected.
    /// Only `null` into a pointer is allowed beyond structural equality.
    pub fn accepts(&self, value: &Type) -> bool {
        self == value || (self.is_pointer() && *value == Type::Null)
    }
}

impl fmt::Display for Type {
    /// Renders in BX type syntax, so `int*[3]` reads back to the same type
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Pointer { target } => write!(f, "{}*", target),
            Type::Array { length, element } => write!(f, "{}[{}]", element, length),
            Type::Struct { fields } => {
                write!(f, "struct {{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", field.name, field.ty)?;
                }
                write!(f, " }}")
            }
            Type::Unresolved => write!(f, "<unresolved>"),
        }
    }
}

/// Render a type list as `int, bool*`
pub fn format_types(types: &[Type]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

/// The type of a procedure: ordered parameter types plus return type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcSignature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl ProcSignature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }

    /// Two signatures clash as overloads when their parameter lists are
    /// identical. The return type never disambiguates.
    pub fn same_params(&self, other: &ProcSignature) -> bool {
        self.params == other.params
    }

    /// Exact match of a call's argument types against the parameters
    pub fn accepts_args(&self, args: &[Type]) -> bool {
        self.params.as_slice() == args
    }
}

impl fmt::Display for ProcSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}): {}", format_types(&self.params), self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    /// A family of types covering every constructor, with near-misses
    /// (same shape, different length or field name) built independently.
    fn sample_types() -> Vec<Type> {
        let leaves = vec![Type::Int, Type::Bool, Type::Void, Type::Null, Type::Unresolved];
        let mut all = leaves.clone();
        for leaf in &leaves {
            all.push(Type::pointer(leaf.clone()));
            all.push(Type::array(0, leaf.clone()));
            all.push(Type::array(3, leaf.clone()));
            all.push(Type::array(3, Type::pointer(leaf.clone())));
            all.push(Type::pointer(Type::array(3, leaf.clone())));
            all.push(Type::Struct {
                fields: vec![StructField::new("a", leaf.clone())],
            });
            all.push(Type::Struct {
                fields: vec![StructField::new("b", leaf.clone())],
            });
            all.push(Type::Struct {
                fields: vec![
                    StructField::new("a", leaf.clone()),
                    StructField::new("b", Type::pointer(leaf.clone())),
                ],
            });
        }
        all.push(Type::Struct { fields: vec![] });
        all
    }

    #[test]
    fn test_equality_is_an_equivalence() {
        let left = sample_types();
        let right = sample_types(); // independently built copies
        for (a, a2) in left.iter().zip(right.iter()) {
            assert_eq!(a, a2, "reflexive across independent copies");
        }
        for a in &left {
            for b in &left {
                assert_eq!(a == b, b == a, "symmetric: {} / {}", a, b);
                for c in &left {
                    if a == b && b == c {
                        assert_eq!(a, c, "transitive: {} / {} / {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_equal_types_hash_equal() {
        let left = sample_types();
        let right = sample_types();
        for a in &left {
            for b in &right {
                if a == b {
                    assert_eq!(hash_of(a), hash_of(b), "{} hashed differently", a);
                }
            }
        }
    }

    #[test]
    fn test_equal_signatures_hash_equal() {
        let types = sample_types();
        let sigs: Vec<ProcSignature> = types
            .iter()
            .zip(types.iter().rev())
            .map(|(a, b)| ProcSignature::new(vec![a.clone(), b.clone()], Type::Void))
            .collect();
        let again: Vec<ProcSignature> = types
            .iter()
            .zip(types.iter().rev())
            .map(|(a, b)| ProcSignature::new(vec![a.clone(), b.clone()], Type::Void))
            .collect();
        for s in &sigs {
            for t in &again {
                if s == t {
                    assert_eq!(hash_of(s), hash_of(t));
                }
            }
        }
    }

    #[test]
    fn test_array_length_matters() {
        assert_ne!(Type::array(3, Type::Int), Type::array(4, Type::Int));
        assert_ne!(Type::array(3, Type::Int), Type::array(3, Type::Bool));
        assert_ne!(Type::pointer(Type::Int), Type::pointer(Type::pointer(Type::Int)));
    }

    #[test]
    fn test_struct_field_order_matters() {
        let ab = Type::Struct {
            fields: vec![StructField::new("a", Type::Int), StructField::new("b", Type::Bool)],
        };
        let ba = Type::Struct {
            fields: vec![StructField::new("b", Type::Bool), StructField::new("a", Type::Int)],
        };
        assert_ne!(ab, ba);
        assert_eq!(ab.field("b"), Some(&Type::Bool));
        assert_eq!(ab.field("c"), None);
    }

    #[test]
    fn test_display_round_trips_modifiers() {
        assert_eq!(Type::array(3, Type::pointer(Type::Int)).to_string(), "int*[3]");
        assert_eq!(Type::pointer(Type::array(3, Type::Int)).to_string(), "int[3]*");
        let s = Type::Struct {
            fields: vec![StructField::new("x", Type::Int), StructField::new("next", Type::pointer(Type::Bool))],
        };
        assert_eq!(s.to_string(), "struct { x: int, next: bool* }");
    }

    #[test]
    fn test_resolvedness_is_recursive() {
        assert!(Type::array(2, Type::Int).is_resolved());
        assert!(!Type::pointer(Type::Unresolved).is_resolved());
        let s = Type::Struct { fields: vec![StructField::new("x", Type::Unresolved)] };
        assert!(!s.is_resolved());
    }

    #[test]
    fn test_null_only_fits_pointers() {
        assert!(Type::pointer(Type::Int).accepts(&Type::Null));
        assert!(!Type::Int.accepts(&Type::Null));
        assert!(Type::Int.accepts(&Type::Int));
    }

    #[test]
    fn test_return_type_does_not_distinguish_overloads() {
        let a = ProcSignature::new(vec![Type::Int], Type::Void);
        let b = ProcSignature::new(vec![Type::Int], Type::Bool);
        let c = ProcSignature::new(vec![Type::Int, Type::Int], Type::Void);
        assert!(a.same_params(&b));
        assert!(!a.same_params(&c));
        assert!(a.accepts_args(&[Type::Int]));
        assert!(!a.accepts_args(&[Type::Bool]));
        assert!(!a.accepts_args(&[]));
    }
}
