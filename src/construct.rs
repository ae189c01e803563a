
// used to hand out matcher keys from several edit sessions at once
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// matchers are the drag interchange format
use serde::{Deserialize, Serialize};

// used to print out readable forms of a construct
use std::fmt;

// our own stuff that we need
use crate::datatype::Value;
use crate::source::Function;

pub const OPEN_BRACKET: &str = "(";
pub const CLOSE_BRACKET: &str = ")";
pub const FREE_TEXT: &str = "\"";
pub const FREE_TEXT_SOURCE: &str = "Free Text";

// ------------- Operator -------------
/// Boolean combinator relative to the previous matcher.
///
/// The symbolic forms `&` and `|` are accepted when reading a matcher back
/// from JSON, but a matcher always writes the canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "and", alias = "&")]
    And,
    #[serde(rename = "or", alias = "|")]
    Or,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}
impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Bracket -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Open,
    Close,
}

impl Bracket {
    pub fn symbol(&self) -> &'static str {
        match self {
            Bracket::Open => OPEN_BRACKET,
            Bracket::Close => CLOSE_BRACKET,
        }
    }
    pub fn from_char(c: char) -> Option<Bracket> {
        match c {
            '(' => Some(Bracket::Open),
            ')' => Some(Bracket::Close),
            _ => None,
        }
    }
    pub fn from_comparison(comparison: &str) -> Option<Bracket> {
        match comparison {
            OPEN_BRACKET => Some(Bracket::Open),
            CLOSE_BRACKET => Some(Bracket::Close),
            _ => None,
        }
    }
}

// ------------- Matcher -------------
/// A confirmed query term.
///
/// Matchers are value objects: there are no setters, and every change is a
/// new matcher substituted for the old one by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    key: String,
    operator: Operator,
    comparison: String,
    source: String,
    value: Value,
    text: String,
    #[serde(skip)]
    changing: bool,
}

impl Matcher {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        comparison: impl Into<String>,
        source: impl Into<String>,
        value: impl Into<Value>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            operator,
            comparison: comparison.into(),
            source: source.into(),
            value: value.into(),
            text: text.into(),
            changing: false,
        }
    }
    pub fn bracket(key: impl Into<String>, bracket: Bracket, operator: Operator) -> Self {
        Self::new(key, operator, bracket.symbol(), "", Value::default(), "")
    }
    pub fn free_text(key: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(key, Operator::None, FREE_TEXT, FREE_TEXT_SOURCE, text.clone(), text)
    }
    // It's intentional to keep the fields private and only expose them
    // through getters, so a kept matcher cannot drift from its key.
    pub fn key(&self) -> &str {
        &self.key
    }
    pub fn operator(&self) -> Operator {
        self.operator
    }
    pub fn comparison(&self) -> &str {
        &self.comparison
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn changing(&self) -> bool {
        self.changing
    }
    pub fn bracket_kind(&self) -> Option<Bracket> {
        Bracket::from_comparison(&self.comparison)
    }
    pub fn is_bracket(&self) -> bool {
        self.bracket_kind().is_some()
    }
    pub fn is_free_text(&self) -> bool {
        self.comparison == FREE_TEXT
    }
    pub fn with_operator(&self, operator: Operator) -> Self {
        Self { operator, ..self.clone() }
    }
    pub fn with_changing(&self, changing: bool) -> Self {
        Self { changing, ..self.clone() }
    }

    /// The text shown for a matcher inside the sequence.
    pub fn display(&self, first: bool, hide_operators: bool) -> String {
        let mut line = String::new();
        if !(first
            || hide_operators
            || self.operator == Operator::None
            || self.bracket_kind() == Some(Bracket::Close))
        {
            line.push_str(self.operator.name());
            line.push(' ');
        }
        if !self.is_free_text() {
            line.push_str(&self.comparison);
            line.push(' ');
        }
        line.push_str(&self.text);
        line
    }

    pub fn tooltip(&self) -> String {
        let value = self.value.to_string();
        if value != self.text {
            format!("{}: {}({})", self.source, self.text, value)
        } else {
            format!("{}: {}", self.source, self.text)
        }
    }

    /// The textual encoding used when a sequence is copied out.
    pub fn copy_text(&self) -> String {
        let mut line = String::new();
        if self.operator == Operator::Or {
            line.push_str("or ");
        }
        if self.is_free_text() {
            line.push('"');
            line.push_str(&self.text);
            line.push('"');
            return line;
        }
        if self.is_bracket() {
            line.push_str(&self.comparison);
            return line;
        }
        if self.comparison != "=" {
            line.push_str(&self.comparison);
            line.push(' ');
        }
        if self.text.contains(' ') {
            line.push('"');
            line.push_str(&self.text);
            line.push('"');
        } else {
            line.push_str(&self.text);
        }
        line
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display(false, false))
    }
}

// ------------- Key -------------
pub const GENESIS: u64 = 0;

/// Hands out sequence-unique matcher keys.
///
/// Clones share the same counter, so every edit session cut from one
/// sequence draws from one key space.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    lower_bound: Arc<AtomicU64>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::with_prefix("m")
    }
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lower_bound: Arc::new(AtomicU64::new(GENESIS)),
        }
    }
    pub fn generate(&self) -> String {
        let id = self.lower_bound.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, id)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Item -------------
/// One entry of the visible sequence: the active function (always first)
/// or a matcher.
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Function(&'a Function),
    Matcher(&'a Matcher),
}

impl<'a> Item<'a> {
    pub fn key(&self) -> Option<&'a str> {
        match self {
            Item::Function(_) => None,
            Item::Matcher(m) => Some(m.key()),
        }
    }
    pub fn label(&self) -> String {
        match self {
            Item::Function(f) => f.name().to_owned(),
            Item::Matcher(m) => m.text().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_across_clones() {
        let keys = KeyGenerator::new();
        let other = keys.clone();
        let a = keys.generate();
        let b = other.generate();
        assert_ne!(a, b);
        assert_eq!(a, "m1");
        assert_eq!(b, "m2");
    }

    #[test]
    fn display_hides_operator_when_first() {
        let m = Matcher::new("k", Operator::And, "=", "list", "value", "text");
        assert_eq!(m.display(true, false), "= text");
        assert_eq!(m.display(false, false), "and = text");
        assert_eq!(m.display(false, true), "= text");
        let close = Matcher::bracket("c", Bracket::Close, Operator::Or);
        assert_eq!(close.display(false, false), ") ");
        let free = Matcher::free_text("f", "hello world");
        assert_eq!(free.display(true, false), "hello world");
    }

    #[test]
    fn tooltip_shows_value_only_when_different() {
        let same = Matcher::new("k", Operator::And, "=", "list", "abc", "abc");
        assert_eq!(same.tooltip(), "list: abc");
        let different = Matcher::new("k", Operator::And, "=", "num", 5i64, "five");
        assert_eq!(different.tooltip(), "num: five(5)");
    }

    #[test]
    fn operator_accepts_symbols() {
        let m: Matcher = serde_json::from_str(
            r#"{"key":"a","operator":"|","comparison":"=","source":"s","value":"v","text":"t"}"#,
        )
        .unwrap();
        assert_eq!(m.operator(), Operator::Or);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["operator"], "or");
        assert!(json.get("changing").is_none());
    }
}
