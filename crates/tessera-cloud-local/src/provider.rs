//! Local provider implementation

use crate::error::{LocalError, Result};
use crate::fs::{LocalFs, format_mode, parse_mode};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use tessera_cloud::{AttributeClass, Created, ProviderError, ProviderResult, ResourceProvider};
use tessera_core::Attributes;

pub const LOCAL_FILE: &str = "local_file";
pub const LOCAL_DIRECTORY: &str = "local_directory";

/// Local filesystem provider
pub struct LocalProvider {
    fs: LocalFs,
}

impl LocalProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            fs: LocalFs::new(base),
        }
    }

    pub fn fs(&self) -> &LocalFs {
        &self.fs
    }

    async fn create_file(&self, attributes: &Attributes) -> Result<Created> {
        let path = required_str(attributes, "path")?;
        let inputs = FileInputs::from_attributes(attributes)?;
        self.fs.write_file(path, &inputs.content, inputs.mode).await?;
        tracing::info!("Created file: {}", path);
        Ok(Created::new(path, self.read_file(path).await?))
    }

    async fn update_file(&self, id: &str, attributes: &Attributes) -> Result<Attributes> {
        // Updating a file that disappeared is a drift the next plan resolves
        self.fs.read_file(id).await?;
        let inputs = FileInputs::from_attributes(attributes)?;
        self.fs.write_file(id, &inputs.content, inputs.mode).await?;
        tracing::info!("Updated file: {}", id);
        self.read_file(id).await
    }

    async fn read_file(&self, id: &str) -> Result<Attributes> {
        let info = self.fs.read_file(id).await?;
        let mut attrs = Attributes::new();
        attrs.insert("path".to_string(), json!(id));
        attrs.insert("content".to_string(), json!(info.content));
        attrs.insert("size".to_string(), json!(info.size));
        if let Some(mode) = info.mode {
            attrs.insert("mode".to_string(), json!(format_mode(mode)));
        }
        Ok(attrs)
    }

    async fn create_directory(&self, attributes: &Attributes) -> Result<Created> {
        let path = required_str(attributes, "path")?;
        self.fs.create_dir(path).await?;
        tracing::info!("Created directory: {}", path);
        Ok(Created::new(path, self.read_directory(path).await?))
    }

    async fn read_directory(&self, id: &str) -> Result<Attributes> {
        self.fs.dir_exists(id).await?;
        let mut attrs = Attributes::new();
        attrs.insert("path".to_string(), json!(id));
        Ok(attrs)
    }
}

/// Validated `local_file` inputs
struct FileInputs {
    content: String,
    mode: Option<u32>,
}

impl FileInputs {
    fn from_attributes(attributes: &Attributes) -> Result<Self> {
        let content = match attributes.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(LocalError::InvalidAttribute {
                    attribute: "content",
                    expected: "a string",
                });
            }
        };
        let mode = match attributes.get("mode") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(parse_mode(s).ok_or(LocalError::InvalidAttribute {
                attribute: "mode",
                expected: "a four-digit octal string such as \"0644\"",
            })?),
            Some(_) => {
                return Err(LocalError::InvalidAttribute {
                    attribute: "mode",
                    expected: "a four-digit octal string such as \"0644\"",
                });
            }
        };
        Ok(Self { content, mode })
    }
}

fn required_str<'a>(attributes: &'a Attributes, key: &'static str) -> Result<&'a str> {
    match attributes.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        Some(_) => Err(LocalError::InvalidAttribute {
            attribute: key,
            expected: "a non-empty string",
        }),
        None => Err(LocalError::MissingAttribute(key)),
    }
}

fn unsupported(resource_type: &str) -> ProviderError {
    ProviderError::UnsupportedType(resource_type.to_string())
}

#[async_trait]
impl ResourceProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn resource_types(&self) -> Vec<String> {
        vec![LOCAL_DIRECTORY.to_string(), LOCAL_FILE.to_string()]
    }

    fn classify_attribute(&self, resource_type: &str, attribute: &str) -> AttributeClass {
        match (resource_type, attribute) {
            (_, "path") => AttributeClass::ForcesReplacement,
            (LOCAL_FILE, "size") => AttributeClass::Immutable,
            _ => AttributeClass::Updatable,
        }
    }

    async fn create(
        &self,
        resource_type: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Created> {
        let id = attributes
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let result = match resource_type {
            LOCAL_FILE => self.create_file(attributes).await,
            LOCAL_DIRECTORY => self.create_directory(attributes).await,
            other => return Err(unsupported(other)),
        };
        result.map_err(|e| e.into_provider_error(resource_type, id))
    }

    async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Attributes> {
        let result = match resource_type {
            LOCAL_FILE => self.read_file(id).await,
            LOCAL_DIRECTORY => self.read_directory(id).await,
            other => return Err(unsupported(other)),
        };
        result.map_err(|e| e.into_provider_error(resource_type, id))
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Attributes> {
        let result = match resource_type {
            LOCAL_FILE => self.update_file(id, attributes).await,
            // Directories have nothing to change in place
            LOCAL_DIRECTORY => self.read_directory(id).await,
            other => return Err(unsupported(other)),
        };
        result.map_err(|e| e.into_provider_error(resource_type, id))
    }

    async fn delete(&self, resource_type: &str, id: &str) -> ProviderResult<()> {
        let result = match resource_type {
            LOCAL_FILE => self.fs.remove_file(id).await,
            LOCAL_DIRECTORY => self.fs.remove_dir(id).await,
            other => return Err(unsupported(other)),
        };
        if result.is_ok() {
            tracing::info!("Deleted {}: {}", resource_type, id);
        }
        result.map_err(|e| e.into_provider_error(resource_type, id))
    }
}
