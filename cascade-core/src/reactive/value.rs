//! Plain data held by reactive cells.
//!
//! A [`Value`] is either a primitive, a plain container that has not been
//! read through a cell yet, a nested cell, or an opaque host handle. Plain
//! containers stored in a cell become [`Reactive`] cells the first time their
//! slot is read; host handles are never wrapped.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::cell::{CellId, Reactive};

/// Opaque reference to a host object (a tree node, a window handle...).
///
/// Compared by identity. The engine stores and returns it as-is and never
/// tracks reads through it.
#[derive(Clone)]
pub struct HostRef(Rc<dyn Any>);

impl HostRef {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostRef(..)")
    }
}

/// A dynamically typed value stored in a reactive cell.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A plain array, wrapped lazily on first read through its parent cell.
    Array(Vec<Value>),
    /// A plain object, wrapped lazily on first read through its parent cell.
    Object(IndexMap<String, Value>),
    Reactive(Reactive),
    Host(HostRef),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Reactive(_) => "reactive",
            Value::Host(_) => "host",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostRef> {
        match self {
            Value::Host(host) => Some(host),
            _ => None,
        }
    }

    /// Untracked deep copy into plain JSON.
    ///
    /// Nested cells are read without subscribing anyone. A cell reached again
    /// while it is still being copied (a cycle) becomes `null`; host handles
    /// become `null` as well.
    pub fn to_json(&self) -> serde_json::Value {
        self.json_guarded(&mut HashSet::new())
    }

    pub(crate) fn json_guarded(&self, visiting: &mut HashSet<CellId>) -> serde_json::Value {
        match self {
            Value::Null | Value::Host(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.json_guarded(visiting)).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.json_guarded(visiting)))
                    .collect(),
            ),
            Value::Reactive(cell) => cell.json_guarded(visiting),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for plain data; cells and host handles compare
    /// by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Value::Object(value)
    }
}

impl From<Reactive> for Value {
    fn from(value: Reactive) -> Self {
        Value::Reactive(value)
    }
}

impl From<HostRef> for Value {
    fn from(value: HostRef) -> Self {
        Value::Host(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A property key on a reactive cell.
///
/// Keys are normalized against the container they address: on arrays a
/// numeric field name is an index and `"length"` is [`Key::Length`]; on
/// objects every key is a field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
    Length,
}

impl Key {
    /// Normalize for an array. `None` means the key names no array slot.
    ///
    /// Only canonical decimal names are indices: `"1"` is, `"01"` and `"+1"`
    /// are named fields.
    pub(crate) fn for_array(self) -> Option<Key> {
        match self {
            Key::Field(name) if name == "length" => Some(Key::Length),
            Key::Field(name) => name
                .parse::<usize>()
                .ok()
                .filter(|index| index.to_string() == name)
                .map(Key::Index),
            other => Some(other),
        }
    }

    /// Normalize for an object: the field name.
    pub(crate) fn for_object(self) -> String {
        match self {
            Key::Field(name) => name,
            Key::Index(i) => i.to_string(),
            Key::Length => "length".to_owned(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
            Key::Length => f.write_str("length"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Field(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Field(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Key::Field(value.clone())
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        match usize::try_from(value) {
            Ok(index) => Key::Index(index),
            Err(_) => Key::Field(value.to_string()),
        }
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}
