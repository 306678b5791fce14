//! Declarative state owned by the caller.
//!
//! Values are keyed by canonical property name. The resource identifier is
//! kept in its own slot, apart from the schema properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// A value held in the declarative state.
///
/// Serializes to plain JSON (`"a"`, `1`, `1.5`, `true`, `[...]`, `{...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Concrete kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            StateValue::Bool(_) => "bool",
            StateValue::Int(_) => "int",
            StateValue::Float(_) => "float",
            StateValue::String(_) => "string",
            StateValue::List(_) => "list",
            StateValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Canonical string form of a scalar; `None` for lists and maps.
    pub fn to_canonical_string(&self) -> Option<String> {
        match self {
            StateValue::Bool(b) => Some(b.to_string()),
            StateValue::Int(i) => Some(i.to_string()),
            StateValue::Float(f) => Some(f.to_string()),
            StateValue::String(s) => Some(s.clone()),
            StateValue::List(_) | StateValue::Map(_) => None,
        }
    }

    /// Structural equality that compares numbers by value.
    ///
    /// `Int(1)`, `Float(1.0)` and `String("1")` are all equal; strings that do
    /// not parse as numbers only equal identical strings.
    pub fn loosely_equals(&self, other: &StateValue) -> bool {
        match (self, other) {
            (StateValue::List(a), StateValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (StateValue::Map(a), StateValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loosely_equals(w)))
            }
            (StateValue::String(a), StateValue::String(b)) => a == b,
            (StateValue::Bool(a), StateValue::Bool(b)) => a == b,
            (StateValue::Int(a), StateValue::Int(b)) => a == b,
            (StateValue::String(s), StateValue::Bool(b))
            | (StateValue::Bool(b), StateValue::String(s)) => s.parse::<bool>() == Ok(*b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Int(i) => Some(*i as f64),
            StateValue::Float(f) => Some(*f),
            StateValue::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::String(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Float(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(value: Vec<StateValue>) -> Self {
        StateValue::List(value)
    }
}

impl From<BTreeMap<String, StateValue>> for StateValue {
    fn from(value: BTreeMap<String, StateValue>) -> Self {
        StateValue::Map(value)
    }
}

/// Wrap an object map into the one-element list form.
pub fn wrap_object(map: BTreeMap<String, StateValue>) -> StateValue {
    StateValue::List(vec![StateValue::Map(map)])
}

/// Borrow the map behind an object value.
///
/// Accepts both a plain map and the one-element list form. A list of any
/// other length is rejected.
pub fn unwrap_object<'a>(
    property: &str,
    value: &'a StateValue,
) -> Result<&'a BTreeMap<String, StateValue>, PayloadError> {
    match value {
        StateValue::Map(map) => Ok(map),
        StateValue::List(items) if items.len() == 1 => match &items[0] {
            StateValue::Map(map) => Ok(map),
            other => Err(PayloadError::UnsupportedValueType {
                property: property.to_string(),
                kind: format!("list of {}", other.kind()),
            }),
        },
        StateValue::List(items) => Err(PayloadError::SingletonListShape {
            property: property.to_string(),
            len: items.len(),
        }),
        other => Err(PayloadError::UnsupportedValueType {
            property: property.to_string(),
            kind: other.kind().to_string(),
        }),
    }
}

/// Caller-owned store of a resource's intended or last-known configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    values: BTreeMap<String, StateValue>,
}

impl DeclarativeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy for tests and hosts.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style identifier setter.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<StateValue> {
        self.values.remove(name)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply staged writes; `None` removes the entry.
    pub(crate) fn commit(&mut self, staged: Vec<(String, Option<StateValue>)>) {
        for (name, value) in staged {
            match value {
                Some(value) => {
                    self.values.insert(name, value);
                }
                None => {
                    self.values.remove(&name);
                }
            }
        }
    }
}
