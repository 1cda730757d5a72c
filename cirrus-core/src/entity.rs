//! Entities and query result records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::Key;

/// A property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Key(Key),
    String(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Entity(Box<Entity>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Key> for Value {
    fn from(v: Key) -> Self {
        Value::Key(v)
    }
}

/// A keyed record with named properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Option<Key>,
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key: Some(key),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Copy of this entity carrying only its key.
    pub fn key_only(&self) -> Self {
        Self {
            key: self.key.clone(),
            properties: BTreeMap::new(),
        }
    }
}

/// How much of each entity a result batch carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultType {
    #[default]
    Unspecified,
    /// Complete entities.
    Full,
    /// Only the projected properties.
    Projection,
    /// Only keys.
    KeyOnly,
}

/// An entity as returned by a lookup or a query. This is the unit the cache stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityResult {
    pub entity: Entity,
    /// Entity version; 0 when not reported.
    pub version: i64,
    /// Query cursor positioned after this result; empty for lookups.
    pub cursor: Vec<u8>,
}

impl EntityResult {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            version: 0,
            cursor: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn key(&self) -> Option<&Key> {
        self.entity.key.as_ref()
    }
}
