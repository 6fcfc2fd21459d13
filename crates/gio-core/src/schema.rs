//! Server-declared event schemas and the process-lifetime schema cache.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Declared type of an event parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Int,
    Double,
}

impl ParamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Double => "Double",
        }
    }

    /// Runtime value kinds accepted by validation for this type.
    pub const fn allowed_kinds(self) -> &'static [&'static str] {
        match self {
            Self::String => &["string"],
            Self::Int => &["number", "bigint"],
            Self::Double => &["number"],
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed parameter of an event schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttr {
    pub key: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

impl EventAttr {
    pub fn new(key: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            key: key.into(),
            param_type,
        }
    }
}

/// Event definition as returned by the management service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub attrs: Vec<EventAttr>,
}

impl EventSchema {
    pub fn new(id: impl Into<String>, key: impl Into<String>, attrs: Vec<EventAttr>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            attrs,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Schemas indexed by both `id` and `key`; both identities share one instance.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<EventSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, schema: EventSchema) -> Arc<EventSchema> {
        let schema = Arc::new(schema);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(schema.key.clone(), Arc::clone(&schema));
        entries.insert(schema.id.clone(), Arc::clone(&schema));
        schema
    }

    pub fn get(&self, key_or_id: &str) -> Option<Arc<EventSchema>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key_or_id)
            .cloned()
    }

    /// Number of lookup identities (two per schema unless id equals key).
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
