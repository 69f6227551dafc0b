//! Runtime values stored in instance slots

use std::fmt;
use std::sync::Arc;

use crate::instance::InstanceHandle;

/// A value held by a property slot of a live instance.
///
/// `Lazy` is the sentinel stored for inner objects that have not been
/// constructed yet; the engine replaces it on first access.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / null reference
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (all integral widths)
    Int(i64),
    /// Floating point (all float widths)
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Reference to another instance
    Object(InstanceHandle),
    /// Inner object not constructed yet
    Lazy,
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this is the lazy-init sentinel
    pub fn is_lazy(&self) -> bool {
        matches!(self, Value::Lazy)
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as instance reference
    pub fn as_object(&self) -> Option<&InstanceHandle> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short name of the value's runtime kind (used in diagnostics)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Lazy => "lazy",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Lazy, Value::Lazy) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Identity, not structural equality
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(o) => write!(f, "Object({}#{})", o.type_name(), o.id().as_u64()),
            Value::Lazy => write!(f, "Lazy"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(o) => write!(f, "{}#{}", o.type_name(), o.id().as_u64()),
            Value::Lazy => write!(f, "<lazy>"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::string("hi").as_str(), Some("hi"));
        assert!(Value::Null.is_null());
        assert!(Value::Lazy.is_lazy());
        assert_eq!(Value::default(), Value::Null);
    }

    #[test]
    fn test_object_identity_equality() {
        let a = Instance::new("demo.A", 0);
        let b = Instance::new("demo.A", 0);
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }
}
