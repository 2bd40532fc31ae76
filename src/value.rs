//! Owned attribute values.
//!
//! Used for change descriptions and request scope attributes.
//! `List` carries relationship membership (e.g. the ids on a to-many side).

use serde::{Deserialize, Serialize};

/// A value carried by a change description or request scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or cleared value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Owned string.
    String(String),
    /// Ordered collection, typically relationship ids.
    List(Vec<Value>),
}

impl Value {
    /// Returns `true` if this is `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a `Bool`, otherwise `None`.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value if this is an `Int`, otherwise `None`.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string value if this is a `String`, otherwise `None`.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is a `List`, otherwise `None`.
    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns a string describing the type of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::String(_) => "String",
            Value::List(_) => "List",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::Int(42).as_str(), None);
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_value_list() {
        let v = Value::from(vec![1_i64, 2, 3]);
        assert_eq!(v.type_name(), "List");
        assert_eq!(
            v.as_list(),
            Some(&[Value::Int(1), Value::Int(2), Value::Int(3)][..])
        );
    }

    #[test]
    fn test_value_untagged_yaml() {
        let v: Value = serde_yaml::from_str("[alice, 7, true]").unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::from("alice"),
                Value::Int(7),
                Value::Bool(true)
            ])
        );
    }
}
