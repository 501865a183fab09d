//! Variable expansion
//!
//! `${var.name}` placeholders are replaced before the graph is built, so
//! the reference scanner only ever sees resource references.

use crate::error::{ConfigError, Result};
use crate::model::Declaration;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Environment variables with this prefix override declared variables
pub const ENV_VAR_PREFIX: &str = "TESSERA_VAR_";

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*var\.([A-Za-z_][\w-]*)\s*\}").expect("variable pattern is valid")
});

/// Variable context
pub type Variables = BTreeMap<String, String>;

/// Apply `TESSERA_VAR_<name>` overrides from the environment
#[tracing::instrument(skip(variables))]
pub fn apply_env_overrides(variables: &mut Variables) {
    let mut count = 0;
    for (key, value) in std::env::vars() {
        if let Some(name) = key.strip_prefix(ENV_VAR_PREFIX)
            && !name.is_empty()
        {
            debug!(variable = %name, "Overriding variable from environment");
            variables.insert(name.to_string(), value);
            count += 1;
        }
    }
    info!(env_var_count = count, "Applied environment variable overrides");
}

/// Expand `${var.name}` in every attribute of a declaration
pub fn expand_variables(decl: &mut Declaration, variables: &Variables) -> Result<()> {
    for value in decl.attributes.values_mut() {
        expand_value(value, variables, &decl.address)?;
    }
    Ok(())
}

fn expand_value(value: &mut Value, variables: &Variables, address: &str) -> Result<()> {
    match value {
        Value::String(s) => {
            if !VARIABLE_PATTERN.is_match(s) {
                return Ok(());
            }
            let mut missing = None;
            let expanded = VARIABLE_PATTERN
                .replace_all(s, |caps: &Captures| match variables.get(&caps[1]) {
                    Some(v) => v.clone(),
                    None => {
                        missing.get_or_insert_with(|| caps[1].to_string());
                        String::new()
                    }
                })
                .into_owned();
            if let Some(name) = missing {
                return Err(ConfigError::UndefinedVariable {
                    name,
                    address: address.to_string(),
                });
            }
            *s = expanded;
        }
        Value::Array(items) => {
            for item in items {
                expand_value(item, variables, address)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                expand_value(item, variables, address)?;
            }
        }
        _ => {}
    }
    Ok(())
}
