// used for date values
use chrono::{DateTime, Utc};
// used to (de)serialize values inside matchers
use serde::{Deserialize, Serialize};
// used to print out readable forms of a value
use std::fmt;

/// The resolved value behind a matcher or a suggestion.
///
/// Serialized untagged, so a dragged matcher carries a plain JSON string or
/// number. Dates serialize as RFC 3339 strings and come back as text, the same
/// way they would after any JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            // integral numbers print without a fraction, like 42 rather than 42.0
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(n as f64) }
}
impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self { Value::Date(d) }
}

/// An item produced by a list lookup, before it becomes a suggestion.
///
/// Records are arbitrary JSON; a lookup that serves records should supply
/// text and value getters, otherwise the record's JSON text is used for both.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Text(String),
    Number(f64),
    Record(serde_json::Value),
}

impl SourceItem {
    // text used when no getter is configured
    pub fn plain_text(&self) -> String {
        match self {
            SourceItem::Text(s) => s.clone(),
            SourceItem::Number(n) => Value::Number(*n).to_string(),
            SourceItem::Record(r) => r.to_string(),
        }
    }
    pub fn plain_value(&self) -> Value {
        match self {
            SourceItem::Text(s) => Value::Text(s.clone()),
            SourceItem::Number(n) => Value::Number(*n),
            SourceItem::Record(r) => Value::Text(r.to_string()),
        }
    }
}

impl From<&str> for SourceItem {
    fn from(s: &str) -> Self { SourceItem::Text(s.to_owned()) }
}
impl From<String> for SourceItem {
    fn from(s: String) -> Self { SourceItem::Text(s) }
}
impl From<f64> for SourceItem {
    fn from(n: f64) -> Self { SourceItem::Number(n) }
}
impl From<serde_json::Value> for SourceItem {
    fn from(r: serde_json::Value) -> Self { SourceItem::Record(r) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn untagged_json_shape() {
        assert_eq!(serde_json::to_string(&Value::from("abc")).unwrap(), "\"abc\"");
        assert_eq!(serde_json::to_string(&Value::from(3i64)).unwrap(), "3.0");
        let back: Value = serde_json::from_str("7").unwrap();
        assert_eq!(back, Value::Number(7.0));
        let back: Value = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(back, Value::from("x"));
    }
}
