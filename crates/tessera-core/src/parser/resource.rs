//! `resource` node parsing

use crate::error::{ConfigError, Result};
use crate::model::{Declaration, resource_address};
use kdl::{KdlNode, KdlValue};
use serde_json::{Map, Value};

/// Parse a `resource "<type>" "<name>" { ... }` node
pub fn parse_resource(node: &KdlNode) -> Result<Declaration> {
    let labels: Vec<&str> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .collect();

    let [resource_type, name] = labels.as_slice() else {
        return Err(ConfigError::InvalidConfig(
            "resource requires a type and a name, e.g. resource \"local_file\" \"motd\""
                .to_string(),
        ));
    };

    let address = resource_address(resource_type, name);
    let mut decl = Declaration::new(address.clone(), *resource_type);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends_on" | "depends-on" => {
                    decl.depends_on.extend(
                        child
                            .entries()
                            .iter()
                            .filter_map(|e| e.value().as_string().map(|s| s.to_string())),
                    );
                }
                attribute => {
                    if decl.attributes.contains_key(attribute) {
                        return Err(ConfigError::InvalidConfig(format!(
                            "attribute '{}' of {} is declared more than once",
                            attribute, address
                        )));
                    }
                    let value = node_value(child, &address)?;
                    decl.attributes.insert(attribute.to_string(), value);
                }
            }
        }
    }

    Ok(decl)
}

/// Convert an attribute node into a JSON value
///
/// One argument is a scalar, several form an array; properties and child
/// nodes form an object.
fn node_value(node: &KdlNode, address: &str) -> Result<Value> {
    let name = node.name().value();
    let mut args = Vec::new();
    let mut object = Map::new();

    for entry in node.entries() {
        let value = kdl_to_json(entry.value());
        match entry.name() {
            Some(key) => {
                object.insert(key.value().to_string(), value);
            }
            None => args.push(value),
        }
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let value = node_value(child, address)?;
            object.insert(child.name().value().to_string(), value);
        }
    }

    match (args.len(), object.is_empty()) {
        (0, true) => Err(ConfigError::InvalidConfig(format!(
            "attribute '{}' of {} has no value",
            name, address
        ))),
        (1, true) => Ok(args.remove(0)),
        (_, true) => Ok(Value::Array(args)),
        (0, false) => Ok(Value::Object(object)),
        _ => Err(ConfigError::InvalidConfig(format!(
            "attribute '{}' of {} mixes arguments with properties or children",
            name, address
        ))),
    }
}

fn kdl_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}
