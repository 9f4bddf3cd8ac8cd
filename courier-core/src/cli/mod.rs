pub mod params;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use courier::{ClientProperties, CourierConfig};
use courier_path::{Node, PathAccessor, Sequence, Value};
use serde_json::Value as Json;

use params::{Command, ConfigCommand, Params, PathCommand};

pub fn run(params: Params) -> Result<()> {
    let output = match params.command {
        Command::Path(PathCommand::Get { file, path }) => path_get(&read_json(&file)?, &path)?,
        Command::Path(PathCommand::Set { file, path, value }) => {
            let mut doc = read_json(&file)?;
            path_set(&mut doc, &path, &value)?;
            serde_json::to_string_pretty(&doc)?
        }
        Command::Config(ConfigCommand::Check { file }) => config_check(&file)?,
    };
    println!("{output}");
    Ok(())
}

fn read_json(file: &Path) -> Result<Json> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {file:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {file:?} as JSON"))
}

fn path_get(doc: &Json, path: &str) -> Result<String> {
    let node = PathAccessor::default().get(doc, path)?;
    Ok(serde_json::to_string_pretty(&node_to_json(&node))?)
}

fn path_set(doc: &mut Json, path: &str, raw: &str) -> Result<()> {
    let value = match serde_json::from_str::<Json>(raw) {
        Ok(Json::Null) => Value::Null,
        Ok(Json::Bool(b)) => Value::Bool(b),
        Ok(Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Ok(Json::String(s)) => Value::Str(s),
        Ok(_) => bail!("only scalar values can be written, got {raw}"),
        Err(_) => Value::Str(raw.to_string()),
    };

    if let Err(reason) = PathAccessor::default().try_set(doc, path, value) {
        bail!("cannot write '{path}': {reason}");
    }
    Ok(())
}

fn node_to_json(node: &Node<'_>) -> Json {
    match node {
        Node::Null => Json::Null,
        Node::Value(value) => scalar_to_json(value),
        Node::Object(_) => node.downcast_ref::<Json>().cloned().unwrap_or(Json::Null),
        Node::Sequence(seq) => Json::Array(
            (0..seq.len())
                .map(|i| node_to_json(&seq.element(i)))
                .collect(),
        ),
    }
}

fn scalar_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Json::from(*f),
        Value::Str(s) => Json::String(s.clone()),
    }
}

fn config_check(file: &Path) -> Result<String> {
    let config = CourierConfig::load_or_default(Some(file))?;
    config.validate()?;

    let base = BTreeMap::new();
    let mut out = String::new();
    out.push_str(&format!("config {file:?} is valid\n\n[producer]\n"));
    for (key, value) in ClientProperties::producer(&config, &base) {
        out.push_str(&format!("{key} = {value}\n"));
    }
    out.push_str("\n[consumer]\n");
    for (key, value) in ClientProperties::consumer(&config, &base) {
        out.push_str(&format!("{key} = {value}\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_prints_nested_nodes() {
        let doc = json!({"order": {"id": 7, "lines": [{"sku": "a"}, {"sku": "b"}]}});

        assert_eq!(path_get(&doc, "order.id").unwrap(), "7");
        assert_eq!(path_get(&doc, "order.lines[1].sku").unwrap(), "\"b\"");
        assert_eq!(path_get(&doc, "order.missing").unwrap(), "null");
    }

    #[test]
    fn set_parses_scalars_and_falls_back_to_strings() {
        let mut doc = json!({});
        path_set(&mut doc, "meta.retries", "3").unwrap();
        path_set(&mut doc, "meta.traceId", "abc").unwrap();
        path_set(&mut doc, "meta.flags[1]", "true").unwrap();

        assert_eq!(doc, json!({"meta": {"retries": 3, "traceId": "abc", "flags": [null, true]}}));
        assert!(path_set(&mut doc, "meta", "{\"a\": 1}").is_err());
    }
}
