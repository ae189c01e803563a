//! Session configuration.
//!
//! [`Config`] is the immutable configuration an edit session and a sequence
//! read from: data sources, functions, operator and comparison symbols, limits
//! and timing. It is assembled in code, because data sources carry lookup
//! closures.
//!
//! [`Settings`] is the scalar part that can live in a separate config file
//! (any format the `config` crate reads) and in `QUERYBOX_*` environment
//! variables. Settings may also declare simple sources, either a static item
//! list or a regex pattern, so a server can be configured without code.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::datatype::Value;
use crate::error::{QueryboxError, Result};
use crate::source::{DataSource, ExpressionLookup, Function, ListLookup};

pub const DEFAULT_COMPARISONS: &[&str] = &["=", "!"];
pub const STRING_COMPARISONS: &[&str] = &["=", "!", "*", "!*", "<*", ">*"];
pub const NUMBER_COMPARISONS: &[&str] = &["=", ">", "<", ">=", "<=", "!"];

pub const ITEM_LIMIT: usize = 10;
pub const PROMISE_DELAY_MS: u64 = 1;

/// How operators are surfaced and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatorMode {
    /// No operators, everything is implicitly joined.
    Simple,
    /// Operators but no brackets.
    AgGrid,
    /// Operators and bracket grouping.
    #[default]
    Complex,
}

/// How matchers count against a source's selection limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LimitPolicy {
    /// Every matcher referencing the source is one selection.
    #[default]
    Individual,
    /// A run of matchers on the same source joined by `or` is one selection.
    OrGroup,
}

#[derive(Debug, Clone)]
pub struct Config {
    data_sources: Vec<DataSource>,
    functions: Vec<Function>,
    default_comparison: String,
    and: String,
    or: String,
    comparisons: Vec<String>,
    operators: OperatorMode,
    default_item_limit: usize,
    search_start_length: usize,
    promise_delay: Duration,
    show_when_searching: bool,
    allow_free_text: bool,
    limit_policy: LimitPolicy,
}

impl Config {
    /// Comparisons default to the union of every source's comparisons,
    /// in discovery order.
    pub fn new(data_sources: Vec<DataSource>) -> Self {
        let mut comparisons: Vec<String> = Vec::new();
        for comparison in data_sources.iter().flat_map(|ds| ds.comparisons()) {
            if !comparisons.contains(comparison) {
                comparisons.push(comparison.clone());
            }
        }
        Self {
            data_sources,
            functions: Vec::new(),
            default_comparison: "=".to_owned(),
            and: "&".to_owned(),
            or: "|".to_owned(),
            comparisons,
            operators: OperatorMode::default(),
            default_item_limit: ITEM_LIMIT,
            search_start_length: 0,
            promise_delay: Duration::from_millis(PROMISE_DELAY_MS),
            show_when_searching: false,
            allow_free_text: false,
            limit_policy: LimitPolicy::default(),
        }
    }
    pub fn with_functions(mut self, functions: Vec<Function>) -> Self {
        self.functions = functions;
        self
    }
    pub fn with_default_comparison(mut self, comparison: impl Into<String>) -> Self {
        self.default_comparison = comparison.into();
        self
    }
    pub fn with_symbols(mut self, and: impl Into<String>, or: impl Into<String>) -> Self {
        self.and = and.into();
        self.or = or.into();
        self
    }
    pub fn with_comparisons<I, S>(mut self, comparisons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comparisons = comparisons.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_operators(mut self, operators: OperatorMode) -> Self {
        self.operators = operators;
        self
    }
    pub fn with_item_limit(mut self, limit: usize) -> Self {
        self.default_item_limit = limit;
        self
    }
    pub fn with_search_start_length(mut self, length: usize) -> Self {
        self.search_start_length = length;
        self
    }
    pub fn with_promise_delay(mut self, delay: Duration) -> Self {
        self.promise_delay = delay;
        self
    }
    pub fn show_when_searching(mut self, show: bool) -> Self {
        self.show_when_searching = show;
        self
    }
    pub fn allow_free_text(mut self, allow: bool) -> Self {
        self.allow_free_text = allow;
        self
    }
    pub fn with_limit_policy(mut self, policy: LimitPolicy) -> Self {
        self.limit_policy = policy;
        self
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
    pub fn default_comparison(&self) -> &str {
        &self.default_comparison
    }
    pub fn and_symbol(&self) -> &str {
        &self.and
    }
    pub fn or_symbol(&self) -> &str {
        &self.or
    }
    pub fn comparisons(&self) -> &[String] {
        &self.comparisons
    }
    pub fn operators(&self) -> OperatorMode {
        self.operators
    }
    pub fn default_item_limit(&self) -> usize {
        self.default_item_limit
    }
    pub fn search_start_length(&self) -> usize {
        self.search_start_length
    }
    pub fn promise_delay(&self) -> Duration {
        self.promise_delay
    }
    pub fn shows_when_searching(&self) -> bool {
        self.show_when_searching
    }
    pub fn limit_policy(&self) -> LimitPolicy {
        self.limit_policy
    }
    /// Free text is allowed everywhere when configured, otherwise only under a function that allows it.
    pub fn allows_free_text(&self, function: Option<&Function>) -> bool {
        self.allow_free_text || function.is_some_and(|f| f.allows_free_text())
    }

    pub fn source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.name() == name)
    }
    pub fn source_position(&self, name: &str) -> Option<usize> {
        self.data_sources.iter().position(|ds| ds.name() == name)
    }
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }
    pub fn is_comparison(&self, symbol: &str) -> bool {
        self.comparisons.iter().any(|c| c == symbol)
    }
    /// Operators are parsed unless the mode is simple or the active function forbids them.
    pub fn detects_operators(&self, function: Option<&Function>) -> bool {
        self.operators != OperatorMode::Simple && function.is_none_or(|f| f.allows_operators())
    }
    /// Brackets are structural only in complex mode, and only when the active function allows them.
    pub fn detects_brackets(&self, function: Option<&Function>) -> bool {
        self.operators == OperatorMode::Complex && function.is_none_or(|f| f.allows_brackets())
    }

    /// Source names must be unique; they are how matchers point back at sources.
    pub fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for ds in &self.data_sources {
            if !seen.insert(ds.name()) {
                return Err(QueryboxError::Config(format!("duplicate data source name '{}'", ds.name())));
            }
        }
        if self.and == self.or {
            return Err(QueryboxError::Config(format!("and/or symbols must differ, both are '{}'", self.and)));
        }
        Ok(())
    }
}

// ------------- Settings -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub name: String,
    pub title: String,
    pub comparisons: Vec<String>,
    pub precedence: Option<i64>,
    pub selection_limit: Option<usize>,
    pub functional: bool,
    pub items: Vec<String>,
    pub pattern: Option<String>,
    pub ignore_case: bool,
    pub item_limit: Option<usize>,
}

impl SourceSettings {
    pub fn into_source(self) -> Result<DataSource> {
        let title = if self.title.is_empty() { self.name.clone() } else { self.title };
        let mut ds = if self.comparisons.is_empty() {
            DataSource::new(self.name, title, DEFAULT_COMPARISONS.iter().copied())
        } else {
            DataSource::new(self.name, title, self.comparisons)
        };
        if let Some(precedence) = self.precedence {
            ds = ds.precedence(precedence);
        }
        if let Some(limit) = self.selection_limit {
            ds = ds.selection_limit(limit);
        }
        if self.functional {
            ds = ds.functional();
        }
        if !self.items.is_empty() {
            let mut lookup = ListLookup::items(self.items);
            if self.ignore_case {
                lookup = lookup.ignore_case();
            }
            if let Some(limit) = self.item_limit {
                lookup = lookup.item_limit(limit);
            }
            ds = ds.definition(lookup);
        }
        if let Some(pattern) = self.pattern {
            ds = ds.definition(ExpressionLookup::regex(&pattern, |text: &str| Value::from(text))?);
        }
        Ok(ds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen: String,
    pub default_comparison: String,
    pub and: String,
    pub or: String,
    pub operators: OperatorMode,
    pub default_item_limit: usize,
    pub search_start_length: usize,
    pub promise_delay_ms: u64,
    pub show_when_searching: bool,
    pub allow_free_text: bool,
    pub limit_policy: LimitPolicy,
    pub sources: Vec<SourceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7878".to_owned(),
            default_comparison: "=".to_owned(),
            and: "&".to_owned(),
            or: "|".to_owned(),
            operators: OperatorMode::default(),
            default_item_limit: ITEM_LIMIT,
            search_start_length: 0,
            promise_delay_ms: PROMISE_DELAY_MS,
            show_when_searching: false,
            allow_free_text: false,
            limit_policy: LimitPolicy::default(),
            sources: Vec::new(),
        }
    }
}

impl Settings {
    /// Reads `<path>.{toml,json,yaml,...}` if present, then `QUERYBOX_*` variables.
    pub fn load(path: &str) -> Result<Self> {
        let layered = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(::config::Environment::with_prefix("QUERYBOX").try_parsing(true))
            .build()?;
        Ok(layered.try_deserialize()?)
    }

    pub fn into_config(self) -> Result<Config> {
        let sources = self
            .sources
            .into_iter()
            .map(SourceSettings::into_source)
            .collect::<Result<Vec<_>>>()?;
        let config = Config::new(sources)
            .with_default_comparison(self.default_comparison)
            .with_symbols(self.and, self.or)
            .with_operators(self.operators)
            .with_item_limit(self.default_item_limit)
            .with_search_start_length(self.search_start_length)
            .with_promise_delay(Duration::from_millis(self.promise_delay_ms))
            .show_when_searching(self.show_when_searching)
            .allow_free_text(self.allow_free_text)
            .with_limit_policy(self.limit_policy);
        config.check()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_are_unioned_in_discovery_order() {
        let config = Config::new(vec![
            DataSource::new("a", "A", STRING_COMPARISONS.iter().copied()),
            DataSource::new("b", "B", NUMBER_COMPARISONS.iter().copied()),
        ]);
        assert_eq!(config.comparisons(), ["=", "!", "*", "!*", "<*", ">*", ">", "<", ">=", "<="]);
    }

    #[test]
    fn duplicate_source_names_are_rejected() {
        let config = Config::new(vec![
            DataSource::new("a", "A", DEFAULT_COMPARISONS.iter().copied()),
            DataSource::new("a", "Again", DEFAULT_COMPARISONS.iter().copied()),
        ]);
        assert!(matches!(config.check(), Err(QueryboxError::Config(_))));
    }

    #[test]
    fn settings_build_sources() {
        let settings = Settings {
            sources: vec![
                SourceSettings {
                    name: "colour".into(),
                    items: vec!["red".into(), "green".into()],
                    ignore_case: true,
                    ..SourceSettings::default()
                },
                SourceSettings {
                    name: "code".into(),
                    title: "Codes".into(),
                    pattern: Some("^[A-Z]{3}$".into()),
                    ..SourceSettings::default()
                },
            ],
            ..Settings::default()
        };
        let config = settings.into_config().unwrap();
        assert_eq!(config.data_sources().len(), 2);
        assert_eq!(config.source("colour").unwrap().title(), "colour");
        assert!(config.source("code").unwrap().is_regex_backed());
        assert_eq!(config.comparisons(), ["=", "!"]);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let settings = Settings {
            sources: vec![SourceSettings {
                name: "broken".into(),
                pattern: Some("([".into()),
                ..SourceSettings::default()
            }],
            ..Settings::default()
        };
        assert!(matches!(settings.into_config(), Err(QueryboxError::Config(_))));
    }
}
