//! Model value tree.
//!
//! Every aggregate is `Arc`-wrapped so cloning a value is O(1) and a path
//! write can rebuild only the spine it touches while untouched siblings keep
//! their identity. `same_identity` makes that sharing observable, which the
//! store relies on and tests assert.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::sync::Arc;

/// A model value: the engine's data store holds exactly one of these as its
/// root, and subscription handlers / control closures only ever see clones.
///
/// `Null` doubles as the absent marker: deleted array slots, missing paths
/// and unset defaults all read back as `Null`.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    List(Arc<Vec<Value>>),
    Object(Arc<IndexMap<String, Value>>),
}

impl Value {
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn int(n: i64) -> Self {
        Value::Number(n as f64)
    }

    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Object(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn empty_list() -> Self {
        Value::List(Arc::new(Vec::new()))
    }

    pub fn empty_object() -> Self {
        Value::Object(Arc::new(IndexMap::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields.as_ref()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object()?.get(field)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.as_list()?.get(index)
    }

    /// "Semantically empty" for required-field checks: `Null`, empty text and
    /// empty list. `0`, `false` and `{}` are NOT blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Whether two values are the *same* value, not merely equal ones.
    /// Aggregates compare by Arc pointer; scalars fall back to equality.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    // ----- Copy-on-write helpers -----

    /// New object with one field replaced. Non-objects become a fresh object.
    pub fn with_field(&self, name: &str, value: Value) -> Self {
        match self {
            Value::Object(fields) => {
                let mut new_fields = (**fields).clone();
                new_fields.insert(name.to_string(), value);
                Value::Object(Arc::new(new_fields))
            }
            _ => Value::object([(name, value)]),
        }
    }

    /// New object with one field removed.
    pub fn without_field(&self, name: &str) -> Self {
        match self {
            Value::Object(fields) => {
                let mut new_fields = (**fields).clone();
                new_fields.shift_remove(name);
                Value::Object(Arc::new(new_fields))
            }
            _ => self.clone(),
        }
    }

    /// New list with one slot replaced, padding with `Null` past the end.
    /// Non-lists become a fresh list.
    pub fn with_index(&self, index: usize, value: Value) -> Self {
        let mut items = match self {
            Value::List(items) => (**items).clone(),
            _ => Vec::new(),
        };
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value;
        Value::List(Arc::new(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Text(s.into()),
            serde_json::Value::Array(items) => {
                Value::List(Arc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(fields) => Value::Object(Arc::new(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::Value::from(self))
    }
}
