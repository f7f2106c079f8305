// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag definition file.
//!
//! The tag file is a JSON object mapping each tag name to its initial value
//! and write permission, with an optional explicit type:
//!
//! ```json
//! {
//!     "Speed":   { "value": 0,      "write": true },
//!     "Setpoint": { "value": 12.5,  "write": true },
//!     "Running": { "value": false,  "write": false },
//!     "Recipe":  { "value": "",     "write": true, "type": "string" }
//! }
//! ```
//!
//! Without `type`, the declared type is inferred from the initial value:
//! booleans are `bool`, integers that fit in 32 bits are `int32`, other
//! numbers are `float`, and text is `string`. Definition order is kept.

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use nxbridge_core::{DataType, TagDescriptor, TagRegistry, Value};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Raw File Model
// =============================================================================

/// One entry of the tag file as written.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagEntry {
    value: serde_json::Value,
    write: bool,
    #[serde(default, rename = "type")]
    type_name: Option<String>,
}

/// All entries in file order, duplicates included.
struct TagEntries(Vec<(String, TagEntry)>);

impl<'de> Deserialize<'de> for TagEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = TagEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an object mapping tag names to definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TagEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, TagEntry>()? {
                    entries.push((name, entry));
                }
                Ok(TagEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

// =============================================================================
// TagDefinitions
// =============================================================================

/// Validated tag definitions, in file order.
#[derive(Debug, Clone, Default)]
pub struct TagDefinitions {
    tags: IndexMap<String, TagDescriptor>,
}

impl TagDefinitions {
    /// Loads and validates a tag file.
    ///
    /// `health_tag` is reserved for the health node and may not be used as a
    /// tag name.
    pub fn load(path: impl AsRef<Path>, health_tag: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

        let definitions = Self::parse(&content, health_tag).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            ConfigError::Parse { message, line, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
                line,
            },
            other => other,
        })?;

        debug!(path = %path.display(), tags = definitions.len(), "Tag definitions loaded");
        Ok(definitions)
    }

    /// Parses tag definitions from JSON text.
    pub fn parse(content: &str, health_tag: &str) -> ConfigResult<Self> {
        let TagEntries(entries) = serde_json::from_str(content)
            .map_err(|e| ConfigError::parse_at_line("<tags>", e.to_string(), e.line()))?;

        let mut tags = IndexMap::with_capacity(entries.len());
        for (name, entry) in entries {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_tag(name, "name cannot be empty"));
            }
            if name == health_tag {
                return Err(ConfigError::invalid_tag(
                    name,
                    "name is reserved for the health node",
                ));
            }
            if tags.contains_key(&name) {
                return Err(ConfigError::duplicate_tag(name));
            }

            let descriptor = build_descriptor(&name, &entry)?;
            tags.insert(name, descriptor);
        }

        Ok(Self { tags })
    }

    /// Returns the descriptor for a tag.
    pub fn get(&self, name: &str) -> Option<&TagDescriptor> {
        self.tags.get(name)
    }

    /// Iterates over descriptors in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TagDescriptor> {
        self.tags.values()
    }

    /// Returns the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the number of writable tags.
    pub fn writable_count(&self) -> usize {
        self.tags.values().filter(|t| t.is_writable()).count()
    }

    /// Builds the tag registry.
    pub fn into_registry(self) -> ConfigResult<TagRegistry> {
        TagRegistry::new(self.tags.into_values())
            .map_err(|e| ConfigError::validation("tags", e.to_string()))
    }
}

fn build_descriptor(name: &str, entry: &TagEntry) -> ConfigResult<TagDescriptor> {
    let data_type = match &entry.type_name {
        Some(type_name) => DataType::parse(type_name)
            .ok_or_else(|| ConfigError::unsupported_type(name, type_name.as_str()))?,
        None => infer_type(name, &entry.value)?,
    };

    let descriptor = TagDescriptor::new(name, data_type, entry.write);
    if entry.value.is_null() && entry.type_name.is_some() {
        return Ok(descriptor);
    }

    let initial = Value::from_json(&entry.value).ok_or_else(|| {
        ConfigError::invalid_tag(name, "initial value must be a boolean, number or string")
    })?;
    descriptor.with_initial_value(&initial).ok_or_else(|| {
        ConfigError::invalid_tag(
            name,
            format!("initial value {} is not representable as {}", entry.value, data_type),
        )
    })
}

/// Infers the declared type from an initial value.
fn infer_type(name: &str, value: &serde_json::Value) -> ConfigResult<DataType> {
    match value {
        serde_json::Value::Bool(_) => Ok(DataType::Bool),
        serde_json::Value::String(_) => Ok(DataType::String),
        serde_json::Value::Number(n) if n.is_f64() => Ok(DataType::Float),
        serde_json::Value::Number(n) => {
            let fits = n.as_i64().map_or(false, |v| i32::try_from(v).is_ok());
            if fits {
                Ok(DataType::Int32)
            } else {
                Err(ConfigError::invalid_tag(
                    name,
                    format!("integer {} does not fit in int32", n),
                ))
            }
        }
        serde_json::Value::Null => Err(ConfigError::invalid_tag(
            name,
            "cannot infer a type from null; add \"type\"",
        )),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
            ConfigError::invalid_tag(name, "arrays and structures are not supported"),
        ),
    }
}
