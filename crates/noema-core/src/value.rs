//! Runtime values and their declared types
//!
//! A `ValueType` is what a data-slot kind declares; a `TypedValue` is what a
//! graph occurrence actually holds after coercion. Values live on graph
//! nodes, never on the kind itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a data slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Integer,
    Boolean,
    Text,
    List,
    NumberList,
    Map,
}

impl ValueType {
    /// Best-effort mapping from a free-text type description (the oracle's
    /// type guess) to a declared type. Unrecognized text maps to `Text`.
    pub fn guess(text: &str) -> Self {
        let t = text.trim().to_lowercase();
        if t.contains("number list") || t.contains("list of number") {
            Self::NumberList
        } else if t.contains("integer") {
            Self::Integer
        } else if t.contains("bool") {
            Self::Boolean
        } else if t.contains("map") || t.contains("dict") {
            Self::Map
        } else if t.contains("list") || t.contains("array") {
            Self::List
        } else if t.contains("number") || t.contains("float") || t.contains("numeric") {
            Self::Number
        } else {
            Self::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::List => "list",
            Self::NumberList => "number list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete runtime value held by a graph node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    List(Vec<String>),
    NumberList(Vec<f64>),
    Map(BTreeMap<String, f64>),
}

impl TypedValue {
    pub fn type_of(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Integer(_) => ValueType::Integer,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Text(_) => ValueType::Text,
            Self::List(_) => ValueType::List,
            Self::NumberList(_) => ValueType::NumberList,
            Self::Map(_) => ValueType::Map,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
            Self::NumberList(items) => {
                let rendered: Vec<String> = items.iter().map(|n| n.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Self::Map(map) => {
                let rendered: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_guess_keywords() {
        assert_eq!(ValueType::guess("a list of numbers"), ValueType::NumberList);
        assert_eq!(ValueType::guess("number list"), ValueType::NumberList);
        assert_eq!(ValueType::guess("an integer count"), ValueType::Integer);
        assert_eq!(ValueType::guess("boolean flag"), ValueType::Boolean);
        assert_eq!(ValueType::guess("a mapping from name to value"), ValueType::Map);
        assert_eq!(ValueType::guess("list of equations"), ValueType::List);
        assert_eq!(ValueType::guess("a floating point number"), ValueType::Number);
        assert_eq!(ValueType::guess("free prose"), ValueType::Text);
    }

    #[test]
    fn display_forms() {
        assert_eq!(TypedValue::Number(2.0).to_string(), "2");
        assert_eq!(TypedValue::Number(10.5).to_string(), "10.5");
        assert_eq!(
            TypedValue::List(vec!["x + y = 1".into(), "x - y = 2".into()]).to_string(),
            "[x + y = 1, x - y = 2]"
        );
        let mut m = BTreeMap::new();
        m.insert("x".to_string(), 1.0);
        m.insert("y".to_string(), 0.5);
        assert_eq!(TypedValue::Map(m).to_string(), "{x: 1, y: 0.5}");
    }
}
