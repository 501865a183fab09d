use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// `${a.b.c}`: at least two dotted segments
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][\w-]*(?:\.[A-Za-z_][\w-]*)+)\s*\}")
        .expect("reference pattern is valid")
});

/// A reference from one resource to another resource's attribute
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Address of the referenced resource
    pub address: String,

    /// Attribute read from the referenced resource
    pub attribute: String,
}

impl Reference {
    /// Split a dotted path: the last segment is the attribute, the rest the address
    pub fn parse(path: &str) -> Option<Self> {
        let (address, attribute) = path.rsplit_once('.')?;
        if address.is_empty() || attribute.is_empty() {
            return None;
        }
        Some(Self {
            address: address.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.address, self.attribute)
    }
}

/// Collect every reference embedded in a value (recursing into arrays and objects)
pub fn extract_references(value: &Value) -> Vec<Reference> {
    let mut refs = Vec::new();
    collect_references(value, &mut refs);
    refs
}

fn collect_references(value: &Value, refs: &mut Vec<Reference>) {
    match value {
        Value::String(s) => {
            for caps in REFERENCE_PATTERN.captures_iter(s) {
                if let Some(reference) = Reference::parse(&caps[1]) {
                    refs.push(reference);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, refs)),
        _ => {}
    }
}

/// Substitute references in a value
///
/// `lookup` returns `Ok(Some(value))` for a known value and `Ok(None)` when
/// the value is only known after apply. Any unknown reference makes the whole
/// value unknown. A string that consists of a single reference takes the
/// referenced value as-is, keeping its JSON type; embedded references are
/// rendered as text.
pub fn resolve_value<E, F>(value: &Value, lookup: &mut F) -> Result<Option<Value>, E>
where
    F: FnMut(&Reference) -> Result<Option<Value>, E>,
{
    match value {
        Value::String(s) => resolve_string(s, lookup),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                match resolve_value(item, lookup)? {
                    Some(v) => resolved.push(v),
                    None => return Ok(None),
                }
            }
            Ok(Some(Value::Array(resolved)))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                match resolve_value(item, lookup)? {
                    Some(v) => {
                        resolved.insert(key.clone(), v);
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some(Value::Object(resolved)))
        }
        other => Ok(Some(other.clone())),
    }
}

fn resolve_string<E, F>(s: &str, lookup: &mut F) -> Result<Option<Value>, E>
where
    F: FnMut(&Reference) -> Result<Option<Value>, E>,
{
    if let Some(caps) = REFERENCE_PATTERN.captures(s)
        && let Some(whole) = caps.get(0)
        && whole.start() == 0
        && whole.end() == s.len()
    {
        return match Reference::parse(&caps[1]) {
            Some(reference) => lookup(&reference),
            None => Ok(Some(Value::String(s.to_string()))),
        };
    }

    let mut failure = None;
    let mut unknown = false;
    let rendered = REFERENCE_PATTERN.replace_all(s, |caps: &Captures| {
        if failure.is_some() || unknown {
            return String::new();
        }
        let Some(reference) = Reference::parse(&caps[1]) else {
            return caps[0].to_string();
        };
        match lookup(&reference) {
            Ok(Some(Value::String(text))) => text,
            Ok(Some(other)) => other.to_string(),
            Ok(None) => {
                unknown = true;
                String::new()
            }
            Err(e) => {
                failure = Some(e);
                String::new()
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    if unknown {
        return Ok(None);
    }
    Ok(Some(Value::String(rendered.into_owned())))
}
