//! Document formats understood by the file store

use serde_json::{Map, Value};
use std::path::Path;
use tracing::error;

use switchyard_core::{Error, Result};

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    /// Pick the format for `path`; anything unrecognized is YAML
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => DocumentFormat::Toml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    /// Parse a document into its top-level map
    ///
    /// Blank input is an empty document.
    pub fn parse(&self, contents: &str) -> Result<Map<String, Value>> {
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        let value: Value = match self {
            DocumentFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(contents).map_err(|e| {
                    error!("Failed to parse TOML config: {}", e);
                    Error::Config(format!("Invalid TOML: {}", e))
                })?;
                serde_json::to_value(toml_value).map_err(|e| {
                    error!("Failed to convert TOML to JSON: {}", e);
                    Error::Config(format!("TOML conversion error: {}", e))
                })?
            }
            DocumentFormat::Json => serde_json::from_str(contents).map_err(|e| {
                error!("Failed to parse JSON config: {}", e);
                Error::Config(format!("Invalid JSON: {}", e))
            })?,
            DocumentFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| {
                error!("Failed to parse YAML config: {}", e);
                Error::Config(format!("Invalid YAML: {}", e))
            })?,
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(Error::Config(format!(
                "Configuration document must be a mapping, found {}",
                kind_of(&other)
            ))),
        }
    }

    /// Render a document
    ///
    /// TOML has no null, so null entries are left out of TOML output.
    pub fn render(&self, document: &Map<String, Value>) -> Result<String> {
        match self {
            DocumentFormat::Toml => {
                let without_nulls: Map<String, Value> = document
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let toml_value: toml::Value =
                    serde_json::from_value(Value::Object(without_nulls)).map_err(|e| {
                        error!("Failed to convert JSON to TOML: {}", e);
                        Error::Config(format!("JSON to TOML conversion error: {}", e))
                    })?;
                toml::to_string_pretty(&toml_value).map_err(|e| {
                    error!("Failed to serialize TOML: {}", e);
                    Error::Config(format!("TOML serialization error: {}", e))
                })
            }
            DocumentFormat::Json => {
                let mut rendered = serde_json::to_string_pretty(document)?;
                rendered.push('\n');
                Ok(rendered)
            }
            DocumentFormat::Yaml => serde_yaml::to_string(document).map_err(|e| {
                error!("Failed to serialize YAML: {}", e);
                Error::Config(format!("YAML serialization error: {}", e))
            }),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
