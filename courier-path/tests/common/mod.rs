#![allow(dead_code)]

use courier_path::{Object, PathAccessor, SchemaBuilder, SchemaRegistry, Value, ValueKind};

#[derive(Debug, Clone, PartialEq)]
pub struct MyTestModel {
    pub name: Option<String>,
    pub age: i32,
    pub inner: Option<Inner>,
    pub list: Vec<Option<String>>,
    pub slots: [Option<i64>; 2],
}

impl Default for MyTestModel {
    fn default() -> Self {
        Self {
            name: Some("starting name".to_string()),
            age: 0,
            inner: Some(Inner::default()),
            list: Vec::new(),
            slots: [None, None],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inner {
    pub inner_name: Option<String>,
    pub inner_age: i32,
    pub children: Option<Vec<Option<Inner>>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            inner_name: Some("starting inner name".to_string()),
            inner_age: 1,
            children: None,
        }
    }
}

impl Object for Inner {}

/// Has an `Envelope` embedded the way a subclass would inherit from it.
#[derive(Debug, Default)]
pub struct Audited {
    pub envelope: Envelope,
    pub body: Option<String>,
}

#[derive(Debug, Default)]
pub struct Envelope {
    pub trace_id: Option<String>,
}

/// Never registered as creatable.
#[derive(Debug, Default)]
pub struct Orphan {
    pub label: Option<String>,
}

impl Object for Orphan {}

#[derive(Debug, Default)]
pub struct Holder {
    pub orphan: Option<Orphan>,
}

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            SchemaBuilder::<MyTestModel>::new("MyTestModel")
                .scalar("name", |m| &m.name, |m| &mut m.name)
                .scalar("age", |m| &m.age, |m| &mut m.age)
                .setter("age", Some(ValueKind::Str), |m, v| {
                    match v.as_str().and_then(|s| s.trim().parse::<i32>().ok()) {
                        Some(age) => {
                            m.age = age;
                            true
                        }
                        None => false,
                    }
                })
                .object("inner", |m| &m.inner, |m| &mut m.inner)
                .list("list", |m| &m.list, |m| &mut m.list)
                .array("slots", |m| &m.slots, |m| &mut m.slots)
                .getter("summary", |m| {
                    Value::from(format!("{}:{}", m.name.as_deref().unwrap_or("-"), m.age))
                })
                .build(),
        )
        .register(
            SchemaBuilder::<Inner>::new("Inner")
                .scalar("innerName", |i| &i.inner_name, |i| &mut i.inner_name)
                .scalar("innerAge", |i| &i.inner_age, |i| &mut i.inner_age)
                .list("children", |i| &i.children, |i| &mut i.children)
                .build(),
        )
        .register(
            SchemaBuilder::<Audited>::new("Audited")
                .scalar("body", |a| &a.body, |a| &mut a.body)
                .embed(|a| &a.envelope, |a| &mut a.envelope)
                .build(),
        )
        .register(
            SchemaBuilder::<Envelope>::new("Envelope")
                .scalar("traceId", |e| &e.trace_id, |e| &mut e.trace_id)
                .build(),
        )
        .register(
            SchemaBuilder::<Holder>::new("Holder")
                .object("orphan", |h| &h.orphan, |h| &mut h.orphan)
                .build(),
        )
        .register(
            SchemaBuilder::<Orphan>::new("Orphan")
                .scalar("label", |o| &o.label, |o| &mut o.label)
                .build(),
        )
        .creatable::<Inner>();
    registry
}

pub fn accessor() -> PathAccessor {
    PathAccessor::new(registry())
}
