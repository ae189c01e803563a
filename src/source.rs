//! Data sources, their lookup definitions and function mnemonics.
//!
//! A [`DataSource`] is a named category of values with its own legal
//! comparisons, precedence and selection limit. Each source carries one or more
//! [`Definition`]s:
//! * a [`ListLookup`] serves items from a static list or from an async lookup,
//! * an [`ExpressionLookup`] tests the search text against a regex or predicate
//!   and derives at most one value from it.
//!
//! A [`Function`] is a named query template restricting which sources may be
//! used and how operators, brackets and free text behave while it is active.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

// async lookups hand back boxed futures
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use regex::Regex;

use crate::construct::{Matcher, Operator};
use crate::datatype::{SourceItem, Value};
use crate::error::Result;

/// What an async lookup is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    pub text: String,
    pub operator: Option<Operator>,
    pub matchers: Vec<Matcher>,
}

pub type AsyncLookup = Arc<dyn Fn(LookupQuery) -> BoxFuture<'static, Vec<SourceItem>> + Send + Sync>;
pub type TextGetter = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;
pub type ValueGetter = Arc<dyn Fn(&serde_json::Value) -> Value + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type Derivation = Arc<dyn Fn(&str) -> Value + Send + Sync>;
pub type SequenceValidator = Arc<dyn Fn(&[Matcher]) -> Option<String> + Send + Sync>;

// ------------- List lookup -------------
#[derive(Clone)]
pub enum ListSource {
    Items(Vec<SourceItem>),
    Async(AsyncLookup),
}

#[derive(Clone)]
pub struct ListLookup {
    source: ListSource,
    text_getter: Option<TextGetter>,
    value_getter: Option<ValueGetter>,
    ignore_case: bool,
    item_limit: Option<usize>,
    search_start_length: Option<usize>,
}

impl ListLookup {
    fn with_source(source: ListSource) -> Self {
        Self {
            source,
            text_getter: None,
            value_getter: None,
            ignore_case: false,
            item_limit: None,
            search_start_length: None,
        }
    }
    pub fn items<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SourceItem>,
    {
        Self::with_source(ListSource::Items(items.into_iter().map(Into::into).collect()))
    }
    pub fn future<F, Fut>(lookup: F) -> Self
    where
        F: Fn(LookupQuery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<SourceItem>> + Send + 'static,
    {
        let lookup: AsyncLookup = Arc::new(move |query| lookup(query).boxed());
        Self::with_source(ListSource::Async(lookup))
    }
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }
    pub fn item_limit(mut self, limit: usize) -> Self {
        self.item_limit = Some(limit);
        self
    }
    pub fn search_start_length(mut self, length: usize) -> Self {
        self.search_start_length = Some(length);
        self
    }
    pub fn text_getter(mut self, getter: impl Fn(&serde_json::Value) -> String + Send + Sync + 'static) -> Self {
        self.text_getter = Some(Arc::new(getter));
        self
    }
    pub fn value_getter(mut self, getter: impl Fn(&serde_json::Value) -> Value + Send + Sync + 'static) -> Self {
        self.value_getter = Some(Arc::new(getter));
        self
    }

    pub fn source(&self) -> &ListSource {
        &self.source
    }
    pub fn is_async(&self) -> bool {
        matches!(self.source, ListSource::Async(_))
    }
    pub fn limit(&self, default_item_limit: usize) -> usize {
        self.item_limit.unwrap_or(default_item_limit)
    }
    pub fn min_length(&self) -> usize {
        self.search_start_length.unwrap_or(0)
    }
    pub fn text_of(&self, item: &SourceItem) -> String {
        match (item, &self.text_getter) {
            (SourceItem::Record(record), Some(getter)) => getter(record),
            _ => item.plain_text(),
        }
    }
    pub fn value_of(&self, item: &SourceItem) -> Value {
        match (item, &self.value_getter) {
            (SourceItem::Record(record), Some(getter)) => getter(record),
            _ => item.plain_value(),
        }
    }
    /// Substring containment of the search text in the item's text.
    pub fn matches(&self, item: &SourceItem, search: &str) -> bool {
        let text = self.text_of(item);
        if self.ignore_case {
            text.to_uppercase().contains(&search.to_uppercase())
        } else {
            text.contains(search)
        }
    }
}

impl fmt::Debug for ListLookup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let source = match &self.source {
            ListSource::Items(items) => format!("Items({})", items.len()),
            ListSource::Async(_) => "Async".to_owned(),
        };
        f.debug_struct("ListLookup")
            .field("source", &source)
            .field("ignore_case", &self.ignore_case)
            .field("item_limit", &self.item_limit)
            .field("search_start_length", &self.search_start_length)
            .finish_non_exhaustive()
    }
}

// ------------- Expression lookup -------------
#[derive(Clone)]
pub enum Matching {
    Regex(Regex),
    Predicate(Predicate),
}

#[derive(Clone)]
pub struct ExpressionLookup {
    matching: Matching,
    value: Derivation,
}

impl ExpressionLookup {
    pub fn regex(pattern: &str, value: impl Fn(&str) -> Value + Send + Sync + 'static) -> Result<Self> {
        Ok(Self {
            matching: Matching::Regex(Regex::new(pattern)?),
            value: Arc::new(value),
        })
    }
    pub fn predicate(
        matching: impl Fn(&str) -> bool + Send + Sync + 'static,
        value: impl Fn(&str) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            matching: Matching::Predicate(Arc::new(matching)),
            value: Arc::new(value),
        }
    }
    pub fn is_regex(&self) -> bool {
        matches!(self.matching, Matching::Regex(_))
    }
    pub fn is_match(&self, text: &str) -> bool {
        match &self.matching {
            Matching::Regex(regex) => regex.is_match(text),
            Matching::Predicate(predicate) => predicate(text),
        }
    }
    pub fn derive(&self, text: &str) -> Value {
        (self.value)(text)
    }
}

impl fmt::Debug for ExpressionLookup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let matching = match &self.matching {
            Matching::Regex(regex) => format!("Regex({})", regex.as_str()),
            Matching::Predicate(_) => "Predicate".to_owned(),
        };
        f.debug_struct("ExpressionLookup").field("matching", &matching).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Definition {
    List(ListLookup),
    Expression(ExpressionLookup),
}

impl From<ListLookup> for Definition {
    fn from(lookup: ListLookup) -> Self { Definition::List(lookup) }
}
impl From<ExpressionLookup> for Definition {
    fn from(lookup: ExpressionLookup) -> Self { Definition::Expression(lookup) }
}

// ------------- Data source -------------
#[derive(Debug, Clone)]
pub struct DataSource {
    name: String,
    title: String,
    comparisons: Vec<String>,
    precedence: Option<i64>,
    selection_limit: Option<usize>,
    functional: bool,
    definitions: Vec<Definition>,
}

impl DataSource {
    pub fn new<I, S>(name: impl Into<String>, title: impl Into<String>, comparisons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            title: title.into(),
            comparisons: comparisons.into_iter().map(Into::into).collect(),
            precedence: None,
            selection_limit: None,
            functional: false,
            definitions: Vec::new(),
        }
    }
    pub fn precedence(mut self, precedence: i64) -> Self {
        self.precedence = Some(precedence);
        self
    }
    pub fn selection_limit(mut self, limit: usize) -> Self {
        self.selection_limit = Some(limit);
        self
    }
    pub fn functional(mut self) -> Self {
        self.functional = true;
        self
    }
    pub fn definition(mut self, definition: impl Into<Definition>) -> Self {
        self.definitions.push(definition.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn comparisons(&self) -> &[String] {
        &self.comparisons
    }
    pub fn allows(&self, comparison: &str) -> bool {
        self.comparisons.iter().any(|c| c == comparison)
    }
    /// Absent precedence counts as zero.
    pub fn rank(&self) -> i64 {
        self.precedence.unwrap_or(0)
    }
    pub fn limit(&self) -> Option<usize> {
        self.selection_limit
    }
    pub fn is_functional(&self) -> bool {
        self.functional
    }
    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }
    pub fn is_regex_backed(&self) -> bool {
        self.definitions
            .iter()
            .any(|d| matches!(d, Definition::Expression(e) if e.is_regex()))
    }
    /// Without an active function only non-functional sources are offered;
    /// with one, only the sources it requires or permits.
    pub fn eligible(&self, function: Option<&Function>) -> bool {
        match function {
            None => !self.functional,
            Some(function) => function.permits(&self.name),
        }
    }
}

// ------------- Function -------------
#[derive(Clone, Default)]
pub struct Function {
    name: String,
    required_sources: Vec<String>,
    optional_sources: Vec<String>,
    no_and_or: bool,
    no_brackets: bool,
    allow_free_text: bool,
    validator: Option<SequenceValidator>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
    pub fn requires(mut self, source: impl Into<String>) -> Self {
        self.required_sources.push(source.into());
        self
    }
    pub fn permits_optional(mut self, source: impl Into<String>) -> Self {
        self.optional_sources.push(source.into());
        self
    }
    pub fn no_and_or(mut self) -> Self {
        self.no_and_or = true;
        self
    }
    pub fn no_brackets(mut self) -> Self {
        self.no_brackets = true;
        self
    }
    pub fn allow_free_text(mut self) -> Self {
        self.allow_free_text = true;
        self
    }
    pub fn validator(mut self, validator: impl Fn(&[Matcher]) -> Option<String> + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn required_sources(&self) -> &[String] {
        &self.required_sources
    }
    pub fn permits(&self, source: &str) -> bool {
        self.required_sources.iter().chain(&self.optional_sources).any(|s| s == source)
    }
    pub fn allows_operators(&self) -> bool {
        !self.no_and_or
    }
    pub fn allows_brackets(&self) -> bool {
        !self.no_brackets
    }
    pub fn allows_free_text(&self) -> bool {
        self.allow_free_text
    }
    pub fn check(&self, matchers: &[Matcher]) -> Option<String> {
        self.validator.as_ref().and_then(|v| v(matchers))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("required_sources", &self.required_sources)
            .field("optional_sources", &self.optional_sources)
            .field("no_and_or", &self.no_and_or)
            .field("no_brackets", &self.no_brackets)
            .field("allow_free_text", &self.allow_free_text)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
