//! Records that can be enriched.
//!
//! The engine only needs three primitive operations from a record, captured by
//! the [`Record`] trait. [`Message`] is the concrete record used by the
//! command line tool: an insertion-ordered map of field names to
//! [`FieldValue`]s that reads and writes JSON objects.

use std::fmt;
use std::net::IpAddr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fields starting with this prefix are internal to the pipeline and never
/// considered for enrichment.
pub const INTERNAL_FIELD_PREFIX: &str = "gl2_";

/// A single field value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// An address that was already parsed upstream.
    Ip(IpAddr),
    /// Arrays, objects, and numbers other than plain integers. Numbers keep
    /// the text they were read from.
    Json(serde_json::Value),
}

impl FieldValue {
    /// Returns the string slice if this is a [`FieldValue::Str`].
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Ip(ip) => write!(f, "{ip}"),
            FieldValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<IpAddr> for FieldValue {
    fn from(value: IpAddr) -> Self {
        FieldValue::Ip(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                // anything else keeps its source text, e.g. `1.10` or `1e3`
                Some(i) if i.to_string() == n.as_str() => FieldValue::Int(i),
                _ => FieldValue::Json(Value::Number(n)),
            },
            Value::String(s) => FieldValue::Str(s),
            other => FieldValue::Json(other),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(i) => serializer.serialize_i64(*i),
            FieldValue::Float(v) => serializer.serialize_f64(*v),
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Ip(ip) => serializer.collect_str(ip),
            FieldValue::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(FieldValue::from)
    }
}

/// The operations the enrichment engine needs from a record.
pub trait Record {
    /// Returns the value stored under `name`, if any.
    fn get_field(&self, name: &str) -> Option<&FieldValue>;

    /// Adds a field, replacing the value of an existing field with the same name.
    fn add_field(&mut self, name: &str, value: FieldValue);

    /// Returns the names of all fields currently on the record.
    fn field_names(&self) -> Vec<String>;
}

/// A log or event record with insertion-ordered fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: IndexMap<String, FieldValue>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Record::add_field`].
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.add_field(name, value.into());
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Record for Message {
    #[inline]
    fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[inline]
    fn add_field(&mut self, name: &str, value: FieldValue) {
        // IndexMap keeps the original position when the key already exists
        self.fields.insert(name.to_string(), value);
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
