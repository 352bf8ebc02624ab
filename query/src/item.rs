use crate::error::Result;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// An attribute value as seen by the field filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Set(BTreeSet<String>),
    List(Vec<String>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    /// Numeric view, `None` for unset or non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::None => None,
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) if s.trim().is_empty() => None,
            Value::Str(s) => s.trim().parse().ok(),
            Value::Set(_) | Value::List(_) => None,
        }
    }

    /// Text view used by pattern matching, unset values are empty.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::None => Cow::Borrowed(""),
            Value::Str(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Set view, splitting strings on whitespace.
    pub fn to_set(&self) -> BTreeSet<String> {
        match self {
            Value::None => BTreeSet::new(),
            Value::Set(s) => s.clone(),
            Value::List(l) => l.iter().cloned().collect(),
            Value::Str(s) => s.split_whitespace().map(str::to_string).collect(),
            other => BTreeSet::from([other.to_string()]),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Set(s) => {
                let items: Vec<&str> = s.iter().map(String::as_str).collect();
                f.write_str(&items.join(" "))
            }
            Value::List(l) => f.write_str(&l.join(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(l: Vec<String>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(s: BTreeSet<String>) -> Self {
        Value::Set(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

/// Anything filters can read named attributes from.
pub trait Item {
    fn attribute(&self, name: &str) -> Result<Value>;
}

impl Item for HashMap<String, Value> {
    fn attribute(&self, name: &str) -> Result<Value> {
        Ok(self.get(name).cloned().unwrap_or(Value::None))
    }
}

impl Item for BTreeMap<String, Value> {
    fn attribute(&self, name: &str) -> Result<Value> {
        Ok(self.get(name).cloned().unwrap_or(Value::None))
    }
}
