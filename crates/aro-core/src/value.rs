//! The universal runtime value.
//!
//! [`RuntimeValue`] is the single data type flowing through the ARO runtime:
//! variable contents, event payloads, repository entities, and the plugin
//! exchange format are all expressed with it. The variants mirror the JSON
//! data model with one refinement — integers and doubles are kept apart so
//! that a `64`-bit count never silently becomes `64.0`, and booleans survive
//! a JSON round-trip without degrading to integers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed ARO value.
///
/// Ordering of the untagged variants matters for deserialization: `Int` is
/// tried before `Float` so integral JSON numbers keep their integer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum RuntimeValue {
    /// The absent value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// An IEEE-754 double.
    Float(f64),
    /// A UTF-8 string.
    Text(String),
    /// An ordered sequence of values.
    List(Vec<RuntimeValue>),
    /// A mapping from string keys to values.
    Map(BTreeMap<String, RuntimeValue>),
}

impl RuntimeValue {
    /// Returns the type label used by the qualifier wire protocol and the
    /// qualifier registry's accepted-input sets.
    pub fn type_label(&self) -> ValueType {
        match self {
            RuntimeValue::Null => ValueType::Null,
            RuntimeValue::Bool(_) => ValueType::Boolean,
            RuntimeValue::Int(_) => ValueType::Integer,
            RuntimeValue::Float(_) => ValueType::Double,
            RuntimeValue::Text(_) => ValueType::String,
            RuntimeValue::List(_) => ValueType::Sequence,
            RuntimeValue::Map(_) => ValueType::Mapping,
        }
    }

    /// Truthiness used by handler guards and `expect`.
    ///
    /// Null and `false` are falsy; zero is falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::Null => false,
            RuntimeValue::Bool(b) => *b,
            RuntimeValue::Int(n) => *n != 0,
            RuntimeValue::Float(f) => *f != 0.0,
            RuntimeValue::Text(s) => !s.is_empty(),
            RuntimeValue::List(l) => !l.is_empty(),
            RuntimeValue::Map(m) => !m.is_empty(),
        }
    }

    /// Looks up a property of a mapping value.
    pub fn property(&self, name: &str) -> Option<&RuntimeValue> {
        match self {
            RuntimeValue::Map(map) => map.get(name),
            _ => None,
        }
    }

    /// Returns the sequence element at `index` counted **from the back**
    /// (0 = last, 1 = penultimate, …), the convention of integer list-index
    /// qualifiers.
    pub fn reverse_index(&self, index: usize) -> Option<&RuntimeValue> {
        match self {
            RuntimeValue::List(items) if index < items.len() => {
                items.get(items.len() - 1 - index)
            }
            _ => None,
        }
    }

    /// Converts into the `serde_json` representation used on the plugin
    /// boundary. Integers stay integers; non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RuntimeValue::Null => serde_json::Value::Null,
            RuntimeValue::Bool(b) => serde_json::Value::Bool(*b),
            RuntimeValue::Int(n) => serde_json::Value::from(*n),
            RuntimeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            RuntimeValue::Text(s) => serde_json::Value::String(s.clone()),
            RuntimeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(RuntimeValue::to_json).collect())
            }
            RuntimeValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Builds a value from its `serde_json` representation.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RuntimeValue::Null,
            serde_json::Value::Bool(b) => RuntimeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RuntimeValue::Int(i)
                } else {
                    RuntimeValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => RuntimeValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                RuntimeValue::List(items.iter().map(RuntimeValue::from_json).collect())
            }
            serde_json::Value::Object(map) => RuntimeValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), RuntimeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convenience constructor for a mapping value.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, RuntimeValue)>,
        K: Into<String>,
    {
        RuntimeValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the string content if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RuntimeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the sequence content if this is a list value.
    pub fn as_list(&self) -> Option<&[RuntimeValue]> {
        match self {
            RuntimeValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeValue {
    /// Renders the value in business terms: strings are printed bare, other
    /// values in their JSON form. This is what `log` writes to the console.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Text(s) => f.write_str(s),
            RuntimeValue::Null => f.write_str("null"),
            other => f.write_str(&other.to_json().to_string()),
        }
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Bool(b)
    }
}

impl From<i64> for RuntimeValue {
    fn from(n: i64) -> Self {
        RuntimeValue::Int(n)
    }
}

impl From<f64> for RuntimeValue {
    fn from(f: f64) -> Self {
        RuntimeValue::Float(f)
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::Text(s.to_string())
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::Text(s)
    }
}

impl From<Vec<RuntimeValue>> for RuntimeValue {
    fn from(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::List(items)
    }
}

// =============================================================================
// Value type taxonomy
// =============================================================================

/// The seven-way type taxonomy shared by the qualifier registry and the
/// plugin wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    String,
    Integer,
    Double,
    Boolean,
    Sequence,
    Mapping,
    Null,
}

impl ValueType {
    /// The wire-protocol spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::Sequence => "sequence",
            ValueType::Mapping => "mapping",
            ValueType::Null => "null",
        }
    }

    /// Parses a wire-protocol type label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ValueType::String),
            "integer" => Some(ValueType::Integer),
            "double" => Some(ValueType::Double),
            "boolean" => Some(ValueType::Boolean),
            "sequence" => Some(ValueType::Sequence),
            "mapping" => Some(ValueType::Mapping),
            "null" => Some(ValueType::Null),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
