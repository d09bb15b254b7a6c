//! Coercion of loosely-typed oracle output into declared value types
//!
//! The oracle answers in free text; these converters normalize that text
//! into a `TypedValue`. Failure is an `Error::Conversion` — the kind-level
//! caller decides whether to fall back to a declared default.

use crate::error::{Error, Result};
use crate::value::{TypedValue, ValueType};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+\.?\d*)").expect("static regex"))
}

fn leading_integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+)").expect("static regex"))
}

/// Coerce raw oracle text into the target type.
pub fn coerce(raw: &str, ty: ValueType) -> Result<TypedValue> {
    match ty {
        ValueType::Number => parse_number(raw).map(TypedValue::Number),
        ValueType::Integer => parse_integer(raw).map(TypedValue::Integer),
        ValueType::Boolean => parse_boolean(raw).map(TypedValue::Boolean),
        ValueType::Text => Ok(TypedValue::Text(raw.trim().to_string())),
        ValueType::List => Ok(TypedValue::List(split_list(raw))),
        ValueType::NumberList => parse_number_list(raw).map(TypedValue::NumberList),
        ValueType::Map => parse_map(raw).map(TypedValue::Map),
    }
}

/// Parse the leading numeric substring, e.g. "2.0 (two)" -> 2.0.
pub fn parse_number(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Ok(n);
    }
    leading_number_re()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| Error::conversion(raw, ValueType::Number))
}

/// Parse the leading integer substring.
pub fn parse_integer(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    leading_integer_re()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| Error::conversion(raw, ValueType::Integer))
}

/// Textual true/false, or any numeric value treated as 0 = false.
pub fn parse_boolean(raw: &str) -> Result<bool> {
    let t = raw.trim().to_lowercase();
    if t.contains("true") {
        return Ok(true);
    }
    if t.contains("false") {
        return Ok(false);
    }
    if let Ok(n) = t.parse::<f64>() {
        return Ok(n != 0.0);
    }
    Err(Error::conversion(raw, ValueType::Boolean))
}

/// Split bracket/paren/comma-delimited text into elements. A single element
/// containing spaces falls back to whitespace splitting; empty text yields
/// an empty list. Never fails.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut text = raw.trim();
    let delimited = (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('(') && text.ends_with(')'))
        || (text.starts_with('{') && text.ends_with('}'));
    if delimited && text.len() >= 2 {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return Vec::new();
    }
    let parts: Vec<String> = text
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() == 1 && parts[0].contains(' ') && !parts[0].contains('=') {
        return parts[0].split_whitespace().map(str::to_string).collect();
    }
    parts
}

/// Element-wise numeric coercion of a split list.
pub fn parse_number_list(raw: &str) -> Result<Vec<f64>> {
    split_list(raw).iter().map(|e| parse_number(e)).collect()
}

/// Parse `{k: v, ...}` text with numeric values.
pub fn parse_map(raw: &str) -> Result<BTreeMap<String, f64>> {
    let mut text = raw.trim();
    if text.starts_with('{') && text.ends_with('}') && text.len() >= 2 {
        text = text[1..text.len() - 1].trim();
    }
    let mut map = BTreeMap::new();
    if text.is_empty() {
        return Ok(map);
    }
    for pair in text.split(',') {
        let (key, val) = pair
            .split_once(':')
            .ok_or_else(|| Error::conversion(raw, ValueType::Map))?;
        let key = key.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        if key.is_empty() {
            return Err(Error::conversion(raw, ValueType::Map));
        }
        map.insert(key, parse_number(val)?);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_leading_substring() {
        assert_eq!(parse_number("2.0").unwrap(), 2.0);
        assert_eq!(parse_number("  -3.5 meters").unwrap(), -3.5);
        assert_eq!(parse_number("42").unwrap(), 42.0);
        assert!(parse_number("no digits here").is_err());
    }

    #[test]
    fn integer_leading_substring() {
        assert_eq!(parse_integer("7th").unwrap(), 7);
        assert_eq!(parse_integer("-12").unwrap(), -12);
        assert!(parse_integer("x").is_err());
    }

    #[test]
    fn boolean_textual_and_numeric() {
        assert!(parse_boolean("True").unwrap());
        assert!(!parse_boolean(" false ").unwrap());
        assert!(parse_boolean("1").unwrap());
        assert!(!parse_boolean("0").unwrap());
        assert!(parse_boolean("maybe").is_err());
    }

    #[test]
    fn list_bracket_and_comma() {
        assert_eq!(split_list("[a, b, c]"), vec!["a", "b", "c"]);
        assert_eq!(split_list("(1,2)"), vec!["1", "2"]);
        assert_eq!(
            split_list("x + y = 1, x - y = 2"),
            vec!["x + y = 1", "x - y = 2"]
        );
        assert!(split_list("").is_empty());
        assert!(split_list("[]").is_empty());
    }

    #[test]
    fn list_single_element_space_fallback() {
        assert_eq!(split_list("3 4 5 6"), vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn number_list_elementwise() {
        assert_eq!(parse_number_list("[1, 2.5, -3]").unwrap(), vec![1.0, 2.5, -3.0]);
        assert!(parse_number_list("[1, two]").is_err());
    }

    #[test]
    fn map_pairs() {
        let m = parse_map("{x: 1, y: 0.5}").unwrap();
        assert_eq!(m["x"], 1.0);
        assert_eq!(m["y"], 0.5);
        assert!(parse_map("{x}").is_err());
        assert!(parse_map("{}").unwrap().is_empty());
    }

    #[test]
    fn coerce_dispatch() {
        assert_eq!(coerce("2", ValueType::Number).unwrap(), TypedValue::Number(2.0));
        assert_eq!(
            coerce("hello world", ValueType::Text).unwrap(),
            TypedValue::Text("hello world".into())
        );
        assert!(coerce("not a map", ValueType::Map).is_err());
    }
}
