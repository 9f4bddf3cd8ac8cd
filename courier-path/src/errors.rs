use thiserror::Error;
use crate::value::ValueKind;

/// Hard input failures. Everything structural resolves to null / `false` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path cannot be empty")]
    EmptyPath,
}

/// Why a write through a path was rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SetError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    #[error("type '{0}' has no registered schema")]
    Unregistered(&'static str),

    #[error("type '{type_name}' has no property '{property}'")]
    UnknownProperty {
        type_name: &'static str,
        property: String,
    },

    #[error("property '{0}' has no writable field or matching setter")]
    NotWritable(String),

    #[error("cannot assign null to a non-optional field")]
    NullIntoPrimitive,

    #[error("expected a {expected:?} value, found {found:?}")]
    KindMismatch { expected: ValueKind, found: ValueKind },

    #[error("integer {0} does not fit the declared field width")]
    OutOfRange(i64),

    #[error("float {0} does not fit the declared field width")]
    FloatOutOfRange(f64),

    #[error("cannot assign a scalar over an object or sequence field")]
    ContainerAssignment,

    #[error("index {index} is outside fixed-size sequence of length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("index {0} is past the largest index a list will grow to")]
    IndexTooLarge(usize),

    #[error("value is not an object")]
    NotAnObject,

    #[error("value is not a sequence")]
    NotASequence,

    #[error("no factory registered for type '{0}'")]
    NotCreatable(&'static str),
}
