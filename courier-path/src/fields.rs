//! Field shapes a schema can describe, and how each one reads, writes and
//! grows.

use std::any::{type_name, Any};

use crate::errors::SetError;
use crate::schema::SchemaRegistry;
use crate::value::{Node, Value, ValueKind};

/// Marker for user types reachable through `object`, `nested` or sequence
/// fields. The type still needs a schema registered to resolve properties.
pub trait Object: Any + Send + Sync {}

/// Leaf types that convert to and from [`Value`].
pub trait Scalar: Any + Send + Sync + Sized {
    const KIND: ValueKind;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self, SetError>;
}

fn mismatch(expected: ValueKind, found: &Value) -> SetError {
    SetError::KindMismatch {
        expected,
        found: found.kind(),
    }
}

macro_rules! int_scalar {
    ($($ty:ty),*) => {$(
        impl Scalar for $ty {
            const KIND: ValueKind = ValueKind::Int;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: &Value) -> Result<Self, SetError> {
                match value {
                    Value::Int(i) => <$ty>::try_from(*i).map_err(|_| SetError::OutOfRange(*i)),
                    other => Err(mismatch(ValueKind::Int, other)),
                }
            }
        }
    )*};
}

int_scalar!(i32, i64, u32);

impl Scalar for u64 {
    const KIND: ValueKind = ValueKind::Int;

    fn to_value(&self) -> Value {
        // Values past i64::MAX degrade to a float rather than wrap.
        i64::try_from(*self)
            .map(Value::Int)
            .unwrap_or(Value::Float(*self as f64))
    }

    fn from_value(value: &Value) -> Result<Self, SetError> {
        match value {
            Value::Int(i) => u64::try_from(*i).map_err(|_| SetError::OutOfRange(*i)),
            other => Err(mismatch(ValueKind::Int, other)),
        }
    }
}

impl Scalar for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: &Value) -> Result<Self, SetError> {
        match value {
            Value::Float(f) => Ok(*f),
            other => Err(mismatch(ValueKind::Float, other)),
        }
    }
}

impl Scalar for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: &Value) -> Result<Self, SetError> {
        match value {
            Value::Float(f) => {
                let narrowed = *f as f32;
                if f.is_finite() && !narrowed.is_finite() {
                    return Err(SetError::FloatOutOfRange(*f));
                }
                Ok(narrowed)
            }
            other => Err(mismatch(ValueKind::Float, other)),
        }
    }
}

impl Scalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Result<Self, SetError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch(ValueKind::Bool, other)),
        }
    }
}

impl Scalar for String {
    const KIND: ValueKind = ValueKind::Str;

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self, SetError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch(ValueKind::Str, other)),
        }
    }
}

/// A field holding a scalar directly. Plain scalars are "primitive" and
/// refuse null; their `Option` wrappers accept it.
pub trait ScalarField: Any + Send + Sync {
    fn node(&self) -> Node<'_>;

    fn assign(&mut self, value: &Value) -> Result<(), SetError>;
}

/// Something that can sit in a sequence slot.
pub trait Element: Any + Send + Sync + Sized {
    fn node(&self) -> Node<'_>;

    fn from_value(value: &Value) -> Result<Self, SetError>;

    fn as_object_mut(&mut self) -> Option<&mut dyn Any>;
}

macro_rules! scalar_slots {
    ($($ty:ty),*) => {$(
        impl ScalarField for $ty {
            fn node(&self) -> Node<'_> {
                Node::Value(self.to_value())
            }

            fn assign(&mut self, value: &Value) -> Result<(), SetError> {
                if value.is_null() {
                    return Err(SetError::NullIntoPrimitive);
                }
                *self = <$ty as Scalar>::from_value(value)?;
                Ok(())
            }
        }

        impl ScalarField for Option<$ty> {
            fn node(&self) -> Node<'_> {
                match self {
                    Some(v) => Node::Value(v.to_value()),
                    None => Node::Null,
                }
            }

            fn assign(&mut self, value: &Value) -> Result<(), SetError> {
                *self = if value.is_null() {
                    None
                } else {
                    Some(<$ty as Scalar>::from_value(value)?)
                };
                Ok(())
            }
        }

        impl Element for $ty {
            fn node(&self) -> Node<'_> {
                Node::Value(self.to_value())
            }

            fn from_value(value: &Value) -> Result<Self, SetError> {
                <$ty as Scalar>::from_value(value)
            }

            fn as_object_mut(&mut self) -> Option<&mut dyn Any> {
                None
            }
        }
    )*};
}

scalar_slots!(bool, i32, i64, u32, u64, f32, f64, String);

impl<T: Object> Element for T {
    fn node(&self) -> Node<'_> {
        Node::Object(self)
    }

    fn from_value(_value: &Value) -> Result<Self, SetError> {
        Err(SetError::ContainerAssignment)
    }

    fn as_object_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

/// Read view over an indexed container.
pub trait Sequence: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Null for an empty slot or an index past the end.
    fn element(&self, index: usize) -> Node<'_>;
}

/// Write view over an indexed container.
pub trait SequenceMut: Sequence {
    /// Make `index` addressable: growable sequences pad with nulls, fixed
    /// ones only bounds-check.
    fn reserve_index(&mut self, index: usize) -> Result<(), SetError>;

    fn assign(&mut self, index: usize, value: &Value) -> Result<(), SetError>;

    /// The element at `index` as a navigable object, created through the
    /// registry when the slot is empty.
    fn element_mut(
        &mut self,
        index: usize,
        registry: &SchemaRegistry,
    ) -> Result<&mut dyn Any, SetError>;
}

fn slot_node<E: Element>(slots: &[Option<E>], index: usize) -> Node<'_> {
    match slots.get(index) {
        Some(Some(element)) => element.node(),
        _ => Node::Null,
    }
}

fn slot_assign<E: Element>(
    slots: &mut [Option<E>],
    index: usize,
    value: &Value,
) -> Result<(), SetError> {
    let len = slots.len();
    let slot = slots
        .get_mut(index)
        .ok_or(SetError::OutOfBounds { index, len })?;
    *slot = if value.is_null() {
        None
    } else {
        Some(E::from_value(value)?)
    };
    Ok(())
}

fn slot_object_mut<'a, E: Element>(
    slots: &'a mut [Option<E>],
    index: usize,
    registry: &SchemaRegistry,
) -> Result<&'a mut dyn Any, SetError> {
    let len = slots.len();
    let slot = slots
        .get_mut(index)
        .ok_or(SetError::OutOfBounds { index, len })?;
    if slot.is_none() {
        *slot = Some(registry.create::<E>()?);
    }
    match slot {
        Some(element) => element.as_object_mut().ok_or(SetError::NotAnObject),
        None => Err(SetError::NotCreatable(type_name::<E>())),
    }
}

fn check_bounds(index: usize, len: usize) -> Result<(), SetError> {
    if index < len {
        Ok(())
    } else {
        Err(SetError::OutOfBounds { index, len })
    }
}

/// Largest index a growable list pads itself up to. Indices past it are
/// rejected rather than allocated.
pub const MAX_GROWABLE_INDEX: usize = i32::MAX as usize;

/// Length a growable list needs so that `index` is in bounds.
pub(crate) fn grown_len(index: usize) -> Result<usize, SetError> {
    if index > MAX_GROWABLE_INDEX {
        return Err(SetError::IndexTooLarge(index));
    }
    Ok(index + 1)
}

impl<E: Element> Sequence for Vec<Option<E>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element(&self, index: usize) -> Node<'_> {
        slot_node(self, index)
    }
}

impl<E: Element> SequenceMut for Vec<Option<E>> {
    fn reserve_index(&mut self, index: usize) -> Result<(), SetError> {
        if Vec::len(self) <= index {
            self.resize_with(grown_len(index)?, || None);
        }
        Ok(())
    }

    fn assign(&mut self, index: usize, value: &Value) -> Result<(), SetError> {
        slot_assign(self, index, value)
    }

    fn element_mut(
        &mut self,
        index: usize,
        registry: &SchemaRegistry,
    ) -> Result<&mut dyn Any, SetError> {
        slot_object_mut(self, index, registry)
    }
}

impl<E: Element, const N: usize> Sequence for [Option<E>; N] {
    fn len(&self) -> usize {
        N
    }

    fn element(&self, index: usize) -> Node<'_> {
        slot_node(self, index)
    }
}

impl<E: Element, const N: usize> SequenceMut for [Option<E>; N] {
    fn reserve_index(&mut self, index: usize) -> Result<(), SetError> {
        check_bounds(index, N)
    }

    fn assign(&mut self, index: usize, value: &Value) -> Result<(), SetError> {
        slot_assign(self, index, value)
    }

    fn element_mut(
        &mut self,
        index: usize,
        registry: &SchemaRegistry,
    ) -> Result<&mut dyn Any, SetError> {
        slot_object_mut(self, index, registry)
    }
}

impl<E: Element> Sequence for Box<[Option<E>]> {
    fn len(&self) -> usize {
        <[Option<E>]>::len(self)
    }

    fn element(&self, index: usize) -> Node<'_> {
        slot_node(self, index)
    }
}

impl<E: Element> SequenceMut for Box<[Option<E>]> {
    fn reserve_index(&mut self, index: usize) -> Result<(), SetError> {
        check_bounds(index, <[Option<E>]>::len(self))
    }

    fn assign(&mut self, index: usize, value: &Value) -> Result<(), SetError> {
        slot_assign(self, index, value)
    }

    fn element_mut(
        &mut self,
        index: usize,
        registry: &SchemaRegistry,
    ) -> Result<&mut dyn Any, SetError> {
        slot_object_mut(self, index, registry)
    }
}

/// A growable sequence field. An absent optional list is created empty on
/// first write.
pub trait ListField: Any + Send + Sync {
    fn sequence(&self) -> Option<&dyn Sequence>;

    fn sequence_mut(&mut self) -> &mut dyn SequenceMut;
}

impl<E: Element> ListField for Vec<Option<E>> {
    fn sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }

    fn sequence_mut(&mut self) -> &mut dyn SequenceMut {
        self
    }
}

impl<E: Element> ListField for Option<Vec<Option<E>>> {
    fn sequence(&self) -> Option<&dyn Sequence> {
        match self {
            Some(list) => Some(list),
            None => None,
        }
    }

    fn sequence_mut(&mut self) -> &mut dyn SequenceMut {
        self.get_or_insert_with(Vec::new)
    }
}

/// A fixed-size sequence field. Arrays are never created or resized.
pub trait ArrayField: Any + Send + Sync {
    fn sequence(&self) -> Option<&dyn Sequence>;

    fn sequence_mut(&mut self) -> Option<&mut dyn SequenceMut>;
}

impl<E: Element, const N: usize> ArrayField for [Option<E>; N] {
    fn sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }

    fn sequence_mut(&mut self) -> Option<&mut dyn SequenceMut> {
        Some(self)
    }
}

impl<E: Element> ArrayField for Box<[Option<E>]> {
    fn sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }

    fn sequence_mut(&mut self) -> Option<&mut dyn SequenceMut> {
        Some(self)
    }
}

impl<E: Element> ArrayField for Option<Box<[Option<E>]>> {
    fn sequence(&self) -> Option<&dyn Sequence> {
        match self {
            Some(array) => Some(array),
            None => None,
        }
    }

    fn sequence_mut(&mut self) -> Option<&mut dyn SequenceMut> {
        match self {
            Some(array) => Some(array),
            None => None,
        }
    }
}
