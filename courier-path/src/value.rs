use std::any::Any;
use std::fmt;

use crate::fields::Sequence;

/// A scalar moving in or out of an object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// What a path resolves to. Objects and sequences are borrowed from the root.
pub enum Node<'a> {
    Null,
    Value(Value),
    Object(&'a dyn Any),
    Sequence(&'a dyn Sequence),
}

impl<'a> Node<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// Scalar view: `Some(Value::Null)` for null, `None` for objects and sequences.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Node::Null => Some(Value::Null),
            Node::Value(v) => Some(v),
            Node::Object(_) | Node::Sequence(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Value(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        match self {
            Node::Object(object) => {
                let object: &'a dyn Any = *object;
                object.downcast_ref::<T>()
            }
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Node::Sequence(seq) => Some(seq.len()),
            _ => None,
        }
    }
}

impl From<Value> for Node<'_> {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            other => Node::Value(other),
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, "Null"),
            Node::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Node::Object(_) => write!(f, "Object(..)"),
            Node::Sequence(seq) => write!(f, "Sequence(len={})", seq.len()),
        }
    }
}

impl PartialEq<Value> for Node<'_> {
    fn eq(&self, other: &Value) -> bool {
        match self {
            Node::Null => other.is_null(),
            Node::Value(v) => v == other,
            _ => false,
        }
    }
}
