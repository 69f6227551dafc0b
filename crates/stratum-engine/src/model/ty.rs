//! Type references used in member signatures
//!
//! Named types are resolved through the `TypeSystem`; only the primitive
//! part of assignability is decided here.

use std::fmt;

use stratum_sdk::Value;

/// Reference to a type in a field, parameter or return position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// No value
    Void,
    /// boolean
    Bool,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// string
    Str,
    /// Any value (dynamically typed)
    Any,
    /// A declared type, by qualified name
    Named(String),
}

impl TypeRef {
    /// Reference a declared type
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Check if this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Qualified name for named types
    pub fn type_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Widening rank for numeric primitives
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            TypeRef::Int => Some(0),
            TypeRef::Long => Some(1),
            TypeRef::Float => Some(2),
            TypeRef::Double => Some(3),
            _ => None,
        }
    }

    /// Primitive assignability (`self` ~> `target`).
    ///
    /// Returns `None` when both sides are named types, which the caller must
    /// decide with the type hierarchy.
    pub fn primitive_assignable_to(&self, target: &TypeRef) -> Option<bool> {
        if self == target || matches!(target, TypeRef::Any) {
            return Some(true);
        }
        match (self, target) {
            (TypeRef::Named(_), TypeRef::Named(_)) => None,
            (TypeRef::Any, _) => Some(true),
            _ => match (self.numeric_rank(), target.numeric_rank()) {
                (Some(from), Some(to)) => Some(from <= to),
                _ => Some(false),
            },
        }
    }

    /// Check if a runtime value can be stored in this type.
    ///
    /// Object values are accepted for any named type; the caller checks the
    /// concrete class when it matters.
    pub fn accepts_value(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeRef::Any, _) | (_, Value::Null) => !self.is_void(),
            (TypeRef::Bool, Value::Bool(_)) => true,
            (TypeRef::Int | TypeRef::Long, Value::Int(_)) => true,
            (TypeRef::Float | TypeRef::Double, Value::Int(_) | Value::Float(_)) => true,
            (TypeRef::Str, Value::Str(_)) => true,
            (TypeRef::Named(_), Value::Object(_)) => true,
            _ => false,
        }
    }

    /// Value held by a freshly allocated slot of this type
    pub fn default_value(&self) -> Value {
        match self {
            TypeRef::Bool => Value::Bool(false),
            TypeRef::Int | TypeRef::Long => Value::Int(0),
            TypeRef::Float | TypeRef::Double => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Rust spelling used in generated stubs
    pub fn stub_type(&self) -> &'static str {
        match self {
            TypeRef::Void => "()",
            TypeRef::Bool => "bool",
            TypeRef::Int => "i32",
            TypeRef::Long => "i64",
            TypeRef::Float => "f32",
            TypeRef::Double => "f64",
            TypeRef::Str => "String",
            TypeRef::Any | TypeRef::Named(_) => "Value",
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Bool => write!(f, "boolean"),
            TypeRef::Int => write!(f, "int"),
            TypeRef::Long => write!(f, "long"),
            TypeRef::Float => write!(f, "float"),
            TypeRef::Double => write!(f, "double"),
            TypeRef::Str => write!(f, "String"),
            TypeRef::Any => write!(f, "Object"),
            TypeRef::Named(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(TypeRef::Int.primitive_assignable_to(&TypeRef::Long), Some(true));
        assert_eq!(TypeRef::Int.primitive_assignable_to(&TypeRef::Double), Some(true));
        assert_eq!(TypeRef::Double.primitive_assignable_to(&TypeRef::Int), Some(false));
        assert_eq!(TypeRef::Str.primitive_assignable_to(&TypeRef::Int), Some(false));
    }

    #[test]
    fn test_any_and_named() {
        assert_eq!(TypeRef::Str.primitive_assignable_to(&TypeRef::Any), Some(true));
        assert_eq!(
            TypeRef::named("a.B").primitive_assignable_to(&TypeRef::named("a.C")),
            None
        );
        assert_eq!(
            TypeRef::named("a.B").primitive_assignable_to(&TypeRef::Int),
            Some(false)
        );
    }

    #[test]
    fn test_accepts_value() {
        assert!(TypeRef::Int.accepts_value(&Value::Int(1)));
        assert!(TypeRef::Double.accepts_value(&Value::Int(1)));
        assert!(!TypeRef::Int.accepts_value(&Value::Float(1.5)));
        assert!(TypeRef::Str.accepts_value(&Value::Null));
        assert!(!TypeRef::Void.accepts_value(&Value::Null));
    }
}
