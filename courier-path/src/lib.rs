pub mod accessor;
pub mod errors;
pub mod fields;
pub mod schema;
pub mod value;
mod json;
mod path;

// Public re-exports for easy access
pub use accessor::PathAccessor;
pub use errors::{PathError, SetError};
pub use fields::{ArrayField, MAX_GROWABLE_INDEX, Element, ListField, Object, Scalar, ScalarField, Sequence, SequenceMut};
pub use schema::{Schema, SchemaBuilder, SchemaRegistry};
pub use value::{Node, Value, ValueKind};
