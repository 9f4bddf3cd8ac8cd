use courier_path::{PathAccessor, Value, MAX_GROWABLE_INDEX};
use serde_json::json;

#[test]
fn json_documents_need_no_schema() {
    let accessor = PathAccessor::default();
    let doc = json!({
        "meta": { "traceId": "4bf92f3577b34da6a3ce929d0e0e4736" },
        "items": [ { "sku": "a-1", "qty": 2 }, null ]
    });

    assert_eq!(
        accessor.get(&doc, "meta.traceId").unwrap(),
        Value::from("4bf92f3577b34da6a3ce929d0e0e4736")
    );
    assert_eq!(accessor.get(&doc, "items[0].qty").unwrap(), Value::Int(2));
    assert!(accessor.get(&doc, "items[1].sku").unwrap().is_null());
    assert!(accessor.get(&doc, "items[9]").unwrap().is_null());
}

#[test]
fn json_writes_create_objects_and_grow_arrays() {
    let accessor = PathAccessor::default();
    let mut doc = json!({});

    assert_eq!(accessor.set(&mut doc, "headers.traceId", "abc"), Ok(true));
    assert_eq!(accessor.set(&mut doc, "lines[2].qty", 3), Ok(true));

    assert_eq!(
        doc,
        json!({
            "headers": { "traceId": "abc" },
            "lines": [null, null, { "qty": 3 }]
        })
    );
}

#[test]
fn json_scalars_cannot_be_descended() {
    let accessor = PathAccessor::default();
    let mut doc = json!({ "count": 1 });

    assert_eq!(accessor.set(&mut doc, "count.value", 2), Ok(false));
    assert_eq!(doc, json!({ "count": 1 }));
}

#[test]
fn json_arrays_refuse_oversized_indices() {
    let accessor = PathAccessor::default();
    let mut doc = json!({ "xs": [1, 2] });

    assert_eq!(accessor.set(&mut doc, &format!("xs[{}]", usize::MAX), 3), Ok(false));
    assert_eq!(accessor.set(&mut doc, &format!("ys[{}].a", usize::MAX), 3), Ok(false));
    assert_eq!(
        accessor.set(&mut doc, &format!("xs[{}]", MAX_GROWABLE_INDEX + 1), 3),
        Ok(false)
    );
    assert_eq!(doc, json!({ "xs": [1, 2] }));
}
