//! KDL parser
//!
//! Reads Tessera declaration files. Top-level nodes:
//!
//! - `resource "<type>" "<name>" { ... }`
//! - `variables { name "value" ... }`

mod resource;

pub use resource::parse_resource;

use crate::error::{ConfigError, Result};
use crate::model::Declaration;
use crate::template::Variables;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Contents of one declaration file
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub declarations: Vec<Declaration>,
    pub variables: Variables,
}

/// Parse a KDL file
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<ParsedDocument> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_kdl_string(&content)
}

/// Parse a KDL string
pub fn parse_kdl_string(content: &str) -> Result<ParsedDocument> {
    let doc: KdlDocument = content.parse()?;
    let mut parsed = ParsedDocument::default();

    for node in doc.nodes() {
        match node.name().value() {
            "resource" => {
                parsed.declarations.push(parse_resource(node)?);
            }
            "variables" => {
                if let Some(vars) = node.children() {
                    for var in vars.nodes() {
                        let key = var.name().value();
                        let value = match var.entries() {
                            [entry] if entry.name().is_none() => entry.value().as_string(),
                            _ => None,
                        }
                        .ok_or_else(|| {
                            ConfigError::InvalidConfig(format!(
                                "variable '{}' must have a single string value",
                                key
                            ))
                        })?;
                        parsed.variables.insert(key.to_string(), value.to_string());
                    }
                }
            }
            other => {
                warn!(node = %other, "Skipping unknown top-level node");
            }
        }
    }

    Ok(parsed)
}
