use std::any::{Any, TypeId};
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::debug;

use crate::errors::{PathError, SetError};
use crate::fields::grown_len;
use crate::json;
use crate::path::{self, Segment};
use crate::schema::{Located, SchemaRegistry};
use crate::value::{Node, Value};

/// Reads and writes nested fields addressed by dotted paths such as
/// `inner.list[2].name`.
///
/// Registered types resolve through their schemas; `serde_json::Value`
/// documents resolve without one. Every miss on the read side is `Null`,
/// every rejected write is `false`. Only an empty path is an error.
#[derive(Clone, Default)]
pub struct PathAccessor {
    registry: Arc<SchemaRegistry>,
}

impl PathAccessor {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn from_shared(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn get<'a>(&self, root: &'a dyn Any, path: &str) -> Result<Node<'a>, PathError> {
        let segments = path::parse(path)?;
        let mut current = Node::Object(root);

        for segment in &segments {
            let owner = match current {
                Node::Object(owner) => owner,
                _ => return Ok(Node::Null),
            };

            let mut next = self.read_property(owner, segment.name);
            if let Some(index) = segment.index {
                next = match next {
                    Node::Sequence(seq) => seq.element(index),
                    _ => Node::Null,
                };
            }
            if next.is_null() {
                return Ok(Node::Null);
            }
            current = normalize(next);
        }

        Ok(current)
    }

    /// Writes `value` at `path`, creating missing intermediates along the way.
    ///
    /// `Ok(false)` means the write was rejected; the reason is logged at debug.
    /// Use [`PathAccessor::try_set`] to get it back as a value.
    pub fn set(
        &self,
        root: &mut dyn Any,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<bool, PathError> {
        match self.try_set(root, path, value) {
            Ok(()) => Ok(true),
            Err(SetError::Path(err)) => Err(err),
            Err(reason) => {
                debug!(path, %reason, "path write rejected");
                Ok(false)
            }
        }
    }

    pub fn try_set(
        &self,
        root: &mut dyn Any,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<(), SetError> {
        let value = value.into();
        let segments = path::parse(path)?;
        let Some((last, intermediate)) = segments.split_last() else {
            return Err(PathError::EmptyPath.into());
        };

        let mut current = root;
        for segment in intermediate {
            current = self.descend(current, segment)?;
        }
        self.assign(current, last, &value)
    }

    fn read_property<'a>(&self, owner: &'a dyn Any, name: &str) -> Node<'a> {
        if let Some(doc) = owner.downcast_ref::<Json>() {
            return json::read(doc, name);
        }

        let Some(found) = self.registry.locate((*owner).type_id(), name) else {
            return Node::Null;
        };

        let mut target = owner;
        for part in &found.parts {
            match part.part(target) {
                Some(next) => target = next,
                None => return Node::Null,
            }
        }

        if let Some(getter) = &found.property.getter {
            return getter.get(target).map(Node::from).unwrap_or(Node::Null);
        }
        match &found.property.field {
            Some(field) => field.read(target),
            None => Node::Null,
        }
    }

    fn locate(&self, owner: &dyn Any, name: &str) -> Result<Located<'_>, SetError> {
        let type_id = (*owner).type_id();
        self.registry
            .locate(type_id, name)
            .ok_or_else(|| self.unknown(type_id, name))
    }

    fn unknown(&self, type_id: TypeId, name: &str) -> SetError {
        match self.registry.type_name_of(type_id) {
            Some(type_name) => SetError::UnknownProperty {
                type_name,
                property: name.to_string(),
            },
            None => SetError::Unregistered("unregistered type"),
        }
    }

    /// Resolves the part of `owner` that actually carries the property.
    fn target<'a>(found: &Located<'_>, owner: &'a mut dyn Any) -> Result<&'a mut dyn Any, SetError> {
        let mut target = owner;
        for part in &found.parts {
            target = part.part_mut(target).ok_or(SetError::NotAnObject)?;
        }
        Ok(target)
    }

    fn descend<'a>(&self, owner: &'a mut dyn Any, segment: &Segment<'_>) -> Result<&'a mut dyn Any, SetError> {
        if owner.is::<Json>() {
            let doc = owner.downcast_mut::<Json>().ok_or(SetError::NotAnObject)?;
            return json::descend(doc, segment);
        }

        let found = self.locate(owner, segment.name)?;
        let field = found
            .property
            .field
            .as_ref()
            .ok_or_else(|| SetError::NotWritable(segment.name.to_string()))?;
        let target = Self::target(&found, owner)?;

        match segment.index {
            None => field.object_mut(target, &self.registry),
            Some(index) => {
                grown_len(index)?;
                let seq = field.sequence_mut(target)?;
                seq.reserve_index(index)?;
                seq.element_mut(index, &self.registry)
            }
        }
    }

    fn assign(&self, owner: &mut dyn Any, segment: &Segment<'_>, value: &Value) -> Result<(), SetError> {
        if owner.is::<Json>() {
            let doc = owner.downcast_mut::<Json>().ok_or(SetError::NotAnObject)?;
            return json::assign(doc, segment, value);
        }

        let found = self.locate(owner, segment.name)?;
        let target = Self::target(&found, owner)?;

        if let Some(index) = segment.index {
            let field = found
                .property
                .field
                .as_ref()
                .ok_or(SetError::NotASequence)?;
            grown_len(index)?;
            let seq = field.sequence_mut(target)?;
            seq.reserve_index(index)?;
            return seq.assign(index, value);
        }

        if let Some(setter) = found.property.setter_for(value) {
            if setter.apply(&mut *target, value) {
                return Ok(());
            }
        }
        match &found.property.field {
            Some(field) => field.write(target, value),
            None => Err(SetError::NotWritable(segment.name.to_string())),
        }
    }
}

/// JSON objects reached through a typed field are read the same way as a
/// JSON root.
fn normalize(node: Node<'_>) -> Node<'_> {
    match node {
        Node::Object(object) => match object.downcast_ref::<Json>() {
            Some(doc) => json::node(doc),
            None => Node::Object(object),
        },
        other => other,
    }
}
