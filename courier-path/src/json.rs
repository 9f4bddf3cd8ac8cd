//! Schema-free navigation of `serde_json::Value` documents.

use std::any::Any;

use serde_json::{Map, Value as Json};

use crate::errors::SetError;
use crate::fields::{grown_len, Object, Sequence};
use crate::path::Segment;
use crate::value::{Node, Value};

impl Object for Json {}

impl Sequence for Vec<Json> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element(&self, index: usize) -> Node<'_> {
        self.get(index).map(node).unwrap_or(Node::Null)
    }
}

pub(crate) fn node(json: &Json) -> Node<'_> {
    match json {
        Json::Null => Node::Null,
        Json::Bool(b) => Node::Value(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .map(Node::Value)
            .unwrap_or(Node::Null),
        Json::String(s) => Node::Value(Value::Str(s.clone())),
        Json::Array(items) => Node::Sequence(items),
        Json::Object(_) => Node::Object(json),
    }
}

pub(crate) fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Json::from(*f),
        Value::Str(s) => Json::String(s.clone()),
    }
}

pub(crate) fn read<'a>(json: &'a Json, name: &str) -> Node<'a> {
    match json {
        Json::Object(map) => map.get(name).map(node).unwrap_or(Node::Null),
        _ => Node::Null,
    }
}

fn fields_mut(json: &mut Json) -> Result<&mut Map<String, Json>, SetError> {
    json.as_object_mut().ok_or(SetError::NotAnObject)
}

fn items_at(slot: &mut Json, index: usize) -> Result<&mut Vec<Json>, SetError> {
    let needed = grown_len(index)?;
    if slot.is_null() {
        *slot = Json::Array(Vec::new());
    }
    let items = slot.as_array_mut().ok_or(SetError::NotASequence)?;
    if items.len() <= index {
        items.resize(needed, Json::Null);
    }
    Ok(items)
}

fn ensure_object(slot: &mut Json) -> Result<&mut dyn Any, SetError> {
    if slot.is_null() {
        *slot = Json::Object(Map::new());
    }
    if !slot.is_object() {
        return Err(SetError::NotAnObject);
    }
    Ok(slot)
}

/// Step into `segment` for a write, creating objects and growing arrays.
pub(crate) fn descend<'a>(json: &'a mut Json, segment: &Segment<'_>) -> Result<&'a mut dyn Any, SetError> {
    if let Some(index) = segment.index {
        grown_len(index)?;
    }
    let child = fields_mut(json)?
        .entry(segment.name.to_string())
        .or_insert(Json::Null);
    match segment.index {
        None => ensure_object(child),
        Some(index) => ensure_object(&mut items_at(child, index)?[index]),
    }
}

pub(crate) fn assign(json: &mut Json, segment: &Segment<'_>, value: &Value) -> Result<(), SetError> {
    if let Some(index) = segment.index {
        grown_len(index)?;
    }
    let fields = fields_mut(json)?;
    match segment.index {
        None => {
            fields.insert(segment.name.to_string(), to_json(value));
        }
        Some(index) => {
            let child = fields
                .entry(segment.name.to_string())
                .or_insert(Json::Null);
            items_at(child, index)?[index] = to_json(value);
        }
    }
    Ok(())
}
