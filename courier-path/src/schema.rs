//! Per-type descriptors standing in for runtime reflection.
//!
//! A [`Schema`] lists the properties of one concrete type: plain fields,
//! computed getters, setters and embedded parts. Schemas and the factories
//! used to auto-create missing intermediates live in a [`SchemaRegistry`]
//! keyed by `TypeId`.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::errors::SetError;
use crate::fields::{ArrayField, ListField, Object, ScalarField, SequenceMut};
use crate::value::{Node, Value, ValueKind};

pub(crate) trait FieldAccess: Send + Sync {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a>;

    fn write(&self, owner: &mut dyn Any, value: &Value) -> Result<(), SetError>;

    fn object_mut<'a>(
        &self,
        _owner: &'a mut dyn Any,
        _registry: &SchemaRegistry,
    ) -> Result<&'a mut dyn Any, SetError> {
        Err(SetError::NotAnObject)
    }

    fn sequence_mut<'a>(&self, _owner: &'a mut dyn Any) -> Result<&'a mut dyn SequenceMut, SetError> {
        Err(SetError::NotASequence)
    }
}

pub(crate) trait GetterAccess: Send + Sync {
    fn get(&self, owner: &dyn Any) -> Option<Value>;
}

pub(crate) trait SetterAccess: Send + Sync {
    fn accepts(&self) -> Option<ValueKind>;

    /// `false` when the owner is the wrong type or the setter declined.
    fn apply(&self, owner: &mut dyn Any, value: &Value) -> bool;
}

pub(crate) trait EmbedAccess: Send + Sync {
    fn part_type(&self) -> TypeId;

    fn part<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any>;

    fn part_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

fn owner_mut<T: Any>(owner: &mut dyn Any) -> Result<&mut T, SetError> {
    owner
        .downcast_mut::<T>()
        .ok_or(SetError::Unregistered(type_name::<T>()))
}

struct ScalarProjection<T, U> {
    get: fn(&T) -> &U,
    get_mut: fn(&mut T) -> &mut U,
}

impl<T: Any + Send + Sync, U: ScalarField> FieldAccess for ScalarProjection<T, U> {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a> {
        match owner.downcast_ref::<T>() {
            Some(owner) => ScalarField::node((self.get)(owner)),
            None => Node::Null,
        }
    }

    fn write(&self, owner: &mut dyn Any, value: &Value) -> Result<(), SetError> {
        ScalarField::assign((self.get_mut)(owner_mut::<T>(owner)?), value)
    }
}

struct ObjectProjection<T, U> {
    get: fn(&T) -> &Option<U>,
    get_mut: fn(&mut T) -> &mut Option<U>,
}

impl<T: Any + Send + Sync, U: Object> FieldAccess for ObjectProjection<T, U> {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a> {
        match owner.downcast_ref::<T>().and_then(|owner| (self.get)(owner).as_ref()) {
            Some(object) => Node::Object(object),
            None => Node::Null,
        }
    }

    fn write(&self, owner: &mut dyn Any, value: &Value) -> Result<(), SetError> {
        if !value.is_null() {
            return Err(SetError::ContainerAssignment);
        }
        *(self.get_mut)(owner_mut::<T>(owner)?) = None;
        Ok(())
    }

    fn object_mut<'a>(
        &self,
        owner: &'a mut dyn Any,
        registry: &SchemaRegistry,
    ) -> Result<&'a mut dyn Any, SetError> {
        let slot = (self.get_mut)(owner_mut::<T>(owner)?);
        if slot.is_none() {
            *slot = Some(registry.create::<U>()?);
        }
        match slot {
            Some(object) => Ok(object),
            None => Err(SetError::NotCreatable(type_name::<U>())),
        }
    }
}

struct NestedProjection<T, U> {
    get: fn(&T) -> &U,
    get_mut: fn(&mut T) -> &mut U,
}

impl<T: Any + Send + Sync, U: Object> FieldAccess for NestedProjection<T, U> {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a> {
        match owner.downcast_ref::<T>() {
            Some(owner) => Node::Object((self.get)(owner)),
            None => Node::Null,
        }
    }

    fn write(&self, _owner: &mut dyn Any, _value: &Value) -> Result<(), SetError> {
        Err(SetError::ContainerAssignment)
    }

    fn object_mut<'a>(
        &self,
        owner: &'a mut dyn Any,
        _registry: &SchemaRegistry,
    ) -> Result<&'a mut dyn Any, SetError> {
        Ok((self.get_mut)(owner_mut::<T>(owner)?))
    }
}

struct ListProjection<T, L> {
    get: fn(&T) -> &L,
    get_mut: fn(&mut T) -> &mut L,
}

impl<T: Any + Send + Sync, L: ListField> FieldAccess for ListProjection<T, L> {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a> {
        match owner.downcast_ref::<T>().and_then(|owner| (self.get)(owner).sequence()) {
            Some(seq) => Node::Sequence(seq),
            None => Node::Null,
        }
    }

    fn write(&self, _owner: &mut dyn Any, _value: &Value) -> Result<(), SetError> {
        Err(SetError::ContainerAssignment)
    }

    fn sequence_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut dyn SequenceMut, SetError> {
        Ok((self.get_mut)(owner_mut::<T>(owner)?).sequence_mut())
    }
}

struct ArrayProjection<T, A> {
    get: fn(&T) -> &A,
    get_mut: fn(&mut T) -> &mut A,
}

impl<T: Any + Send + Sync, A: ArrayField> FieldAccess for ArrayProjection<T, A> {
    fn read<'a>(&self, owner: &'a dyn Any) -> Node<'a> {
        match owner.downcast_ref::<T>().and_then(|owner| (self.get)(owner).sequence()) {
            Some(seq) => Node::Sequence(seq),
            None => Node::Null,
        }
    }

    fn write(&self, _owner: &mut dyn Any, _value: &Value) -> Result<(), SetError> {
        Err(SetError::ContainerAssignment)
    }

    fn sequence_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut dyn SequenceMut, SetError> {
        (self.get_mut)(owner_mut::<T>(owner)?)
            .sequence_mut()
            .ok_or(SetError::NotCreatable(type_name::<A>()))
    }
}

struct GetterProjection<T> {
    get: fn(&T) -> Value,
}

impl<T: Any + Send + Sync> GetterAccess for GetterProjection<T> {
    fn get(&self, owner: &dyn Any) -> Option<Value> {
        owner.downcast_ref::<T>().map(self.get)
    }
}

struct SetterProjection<T> {
    accepts: Option<ValueKind>,
    set: fn(&mut T, Value) -> bool,
}

impl<T: Any + Send + Sync> SetterAccess for SetterProjection<T> {
    fn accepts(&self) -> Option<ValueKind> {
        self.accepts
    }

    fn apply(&self, owner: &mut dyn Any, value: &Value) -> bool {
        match owner.downcast_mut::<T>() {
            Some(owner) => (self.set)(owner, value.clone()),
            None => false,
        }
    }
}

struct EmbedProjection<T, P> {
    get: fn(&T) -> &P,
    get_mut: fn(&mut T) -> &mut P,
}

impl<T: Any + Send + Sync, P: Any + Send + Sync> EmbedAccess for EmbedProjection<T, P> {
    fn part_type(&self) -> TypeId {
        TypeId::of::<P>()
    }

    fn part<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        let owner = owner.downcast_ref::<T>()?;
        Some((self.get)(owner))
    }

    fn part_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let owner = owner.downcast_mut::<T>()?;
        Some((self.get_mut)(owner))
    }
}

#[derive(Default)]
pub(crate) struct Property {
    pub(crate) getter: Option<Box<dyn GetterAccess>>,
    pub(crate) setters: Vec<Box<dyn SetterAccess>>,
    pub(crate) field: Option<Box<dyn FieldAccess>>,
}

impl Property {
    /// Exact kind match first, then a setter that takes anything.
    pub(crate) fn setter_for(&self, value: &Value) -> Option<&dyn SetterAccess> {
        let kind = value.kind();
        self.setters
            .iter()
            .find(|s| s.accepts() == Some(kind))
            .or_else(|| self.setters.iter().find(|s| s.accepts().is_none()))
            .map(|s| &**s)
    }
}

pub struct Schema {
    type_id: TypeId,
    type_name: &'static str,
    properties: HashMap<String, Property>,
    embeds: Vec<Box<dyn EmbedAccess>>,
}

impl Schema {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }
}

/// Typed builder for a [`Schema`] describing `T`.
pub struct SchemaBuilder<T> {
    type_name: &'static str,
    properties: HashMap<String, Property>,
    embeds: Vec<Box<dyn EmbedAccess>>,
    _owner: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> SchemaBuilder<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            properties: HashMap::new(),
            embeds: Vec::new(),
            _owner: PhantomData,
        }
    }

    fn property(&mut self, name: &str) -> &mut Property {
        self.properties.entry(name.to_string()).or_default()
    }

    fn with_field(mut self, name: &str, field: Box<dyn FieldAccess>) -> Self {
        self.property(name).field = Some(field);
        self
    }

    /// A scalar field: `bool`, integers, floats, `String`, or an `Option` of one.
    pub fn scalar<U: ScalarField>(
        self,
        name: &str,
        get: fn(&T) -> &U,
        get_mut: fn(&mut T) -> &mut U,
    ) -> Self {
        self.with_field(name, Box::new(ScalarProjection { get, get_mut }))
    }

    /// An optional nested object, created from its factory when a write passes through it.
    pub fn object<U: Object>(
        self,
        name: &str,
        get: fn(&T) -> &Option<U>,
        get_mut: fn(&mut T) -> &mut Option<U>,
    ) -> Self {
        self.with_field(name, Box::new(ObjectProjection { get, get_mut }))
    }

    /// A nested object that is always present.
    pub fn nested<U: Object>(
        self,
        name: &str,
        get: fn(&T) -> &U,
        get_mut: fn(&mut T) -> &mut U,
    ) -> Self {
        self.with_field(name, Box::new(NestedProjection { get, get_mut }))
    }

    pub fn list<L: ListField>(
        self,
        name: &str,
        get: fn(&T) -> &L,
        get_mut: fn(&mut T) -> &mut L,
    ) -> Self {
        self.with_field(name, Box::new(ListProjection { get, get_mut }))
    }

    pub fn array<A: ArrayField>(
        self,
        name: &str,
        get: fn(&T) -> &A,
        get_mut: fn(&mut T) -> &mut A,
    ) -> Self {
        self.with_field(name, Box::new(ArrayProjection { get, get_mut }))
    }

    /// Computed read accessor. Wins over a field of the same name on reads.
    pub fn getter(mut self, name: &str, get: fn(&T) -> Value) -> Self {
        self.property(name).getter = Some(Box::new(GetterProjection { get }));
        self
    }

    /// Write accessor. `accepts: None` takes any value kind, including null.
    pub fn setter(
        mut self,
        name: &str,
        accepts: Option<ValueKind>,
        set: fn(&mut T, Value) -> bool,
    ) -> Self {
        self.property(name)
            .setters
            .push(Box::new(SetterProjection { accepts, set }));
        self
    }

    /// Properties missing on `T` are looked up on the embedded part, recursively.
    pub fn embed<P: Any + Send + Sync>(
        mut self,
        get: fn(&T) -> &P,
        get_mut: fn(&mut T) -> &mut P,
    ) -> Self {
        self.embeds.push(Box::new(EmbedProjection { get, get_mut }));
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            type_id: TypeId::of::<T>(),
            type_name: self.type_name,
            properties: self.properties,
            embeds: self.embeds,
        }
    }
}

struct Factory {
    make: Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>,
}

/// A property found on a type, plus the embedded parts walked to reach it.
pub(crate) struct Located<'r> {
    pub(crate) parts: Vec<&'r dyn EmbedAccess>,
    pub(crate) property: &'r Property,
}

#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TypeId, Schema>,
    factories: HashMap<TypeId, Factory>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) -> &mut Self {
        tracing::debug!(type_name = schema.type_name, "registered schema");
        self.schemas.insert(schema.type_id, schema);
        self
    }

    /// Lets missing intermediates of type `T` be built with `T::default()`.
    pub fn creatable<T: Default + Any + Send + Sync>(&mut self) -> &mut Self {
        self.factory(T::default)
    }

    pub fn factory<T: Any + Send + Sync>(&mut self, make: fn() -> T) -> &mut Self {
        self.factories.insert(
            TypeId::of::<T>(),
            Factory {
                make: Box::new(move || Box::new(make()) as Box<dyn Any + Send + Sync>),
            },
        );
        self
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.schemas.contains_key(&TypeId::of::<T>())
    }

    pub fn is_creatable<T: Any>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<T>())
    }

    pub fn schema_of<T: Any>(&self) -> Option<&Schema> {
        self.schemas.get(&TypeId::of::<T>())
    }

    pub(crate) fn create<T: Any>(&self) -> Result<T, SetError> {
        let factory = self
            .factories
            .get(&TypeId::of::<T>())
            .ok_or(SetError::NotCreatable(type_name::<T>()))?;
        (factory.make)()
            .downcast::<T>()
            .map(|made| *made)
            .map_err(|_| SetError::NotCreatable(type_name::<T>()))
    }

    pub(crate) fn type_name_of(&self, type_id: TypeId) -> Option<&'static str> {
        self.schemas.get(&type_id).map(|schema| schema.type_name)
    }

    /// Own properties first, then each embedded part in registration order.
    pub(crate) fn locate(&self, type_id: TypeId, name: &str) -> Option<Located<'_>> {
        let schema = self.schemas.get(&type_id)?;
        if let Some(property) = schema.properties.get(name) {
            return Some(Located {
                parts: Vec::new(),
                property,
            });
        }
        for embed in &schema.embeds {
            if let Some(mut found) = self.locate(embed.part_type(), name) {
                found.parts.insert(0, &**embed);
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        size: i32,
    }

    impl Object for Widget {}

    #[test]
    fn factories_build_registered_types_only() {
        let mut registry = SchemaRegistry::new();
        assert_eq!(
            registry.create::<Widget>().err(),
            Some(SetError::NotCreatable(type_name::<Widget>()))
        );

        registry.creatable::<Widget>();
        assert_eq!(registry.create::<Widget>().map(|w| w.size), Ok(0));
    }

    #[test]
    fn setter_prefers_exact_kind() {
        let schema = SchemaBuilder::<Widget>::new("Widget")
            .setter("size", None, |_, _| false)
            .setter("size", Some(ValueKind::Int), |w, v| {
                w.size = v.as_i64().unwrap_or_default() as i32;
                true
            })
            .build();
        let property = &schema.properties["size"];

        let mut widget = Widget::default();
        let setter = property.setter_for(&Value::Int(4)).unwrap();
        assert_eq!(setter.accepts(), Some(ValueKind::Int));
        assert!(setter.apply(&mut widget, &Value::Int(4)));
        assert_eq!(widget.size, 4);

        let fallback = property.setter_for(&Value::Null).unwrap();
        assert_eq!(fallback.accepts(), None);
    }
}
