//! Resolves search text against the configured data sources.
//!
//! Static lists and expression lookups answer immediately and are merged into
//! the buckets on the spot. Async lookups are only described here, as
//! [`LookupRequest`]s carrying the current generation token; see the
//! `interface` module for how they are run, and [`merge_lookup`] for how their
//! answers are folded back in. Lookups never fail for "no match", absence of
//! results is the only signal.

use tracing::debug;

use crate::aggregate::{Buckets, Category, Suggestion};
use crate::construct::{Matcher, Operator};
use crate::datatype::SourceItem;
use crate::interface::{Generation, LookupRequest, LookupResult};
use crate::settings::Config;
use crate::source::{DataSource, Definition, Function, ListLookup, ListSource, LookupQuery};
use crate::tokenizer::{self, Tokens};

/// What the resolver reads from its surroundings.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub config: &'a Config,
    pub function: Option<&'a Function>,
    pub matchers: &'a [Matcher],
    /// Function names are offered only while nothing has been entered yet.
    pub allow_functions: bool,
}

impl<'a> ResolveContext<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, function: None, matchers: &[], allow_functions: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub buckets: Buckets,
    pub pending: Vec<LookupRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct Suggestions {
    pub tokens: Tokens,
    pub buckets: Buckets,
    pub total: usize,
    pub pending: Vec<LookupRequest>,
}

pub fn to_suggestions(ds: &DataSource, lookup: &ListLookup, items: &[SourceItem]) -> Vec<Suggestion> {
    items
        .iter()
        .map(|item| Suggestion::new(ds.name(), lookup.value_of(item), lookup.text_of(item)))
        .collect()
}

fn function_options(search: &str, functions: &[Function]) -> Vec<Suggestion> {
    let wanted = search.to_uppercase();
    functions
        .iter()
        .filter(|f| f.name().to_uppercase().contains(&wanted))
        .map(|f| Suggestion::function(f.name()))
        .collect()
}

/// Resolves `search` against every eligible source.
///
/// `token` must be the value `generation` was just advanced to; it is captured
/// by every async request issued here.
pub fn resolve(
    search: &str,
    operator: Option<Operator>,
    ctx: &ResolveContext<'_>,
    generation: &Generation,
    token: u64,
) -> Resolution {
    let config = ctx.config;
    let mut resolution = Resolution::default();
    let length = search.chars().count();
    if length == 0 || length < config.search_start_length() {
        return resolution;
    }

    let mut buckets = Buckets::new();
    if ctx.allow_functions && !config.functions().is_empty() {
        let functions = function_options(search, config.functions());
        if !functions.is_empty() {
            buckets = buckets.merge_into(&Category::functions(), 0, functions, None);
        }
    }

    for (position, ds) in config.data_sources().iter().enumerate() {
        if !ds.eligible(ctx.function) {
            continue;
        }
        let category = Category::of(ds, position);
        for (index, definition) in ds.definitions().iter().enumerate() {
            match definition {
                Definition::List(lookup) => {
                    if length < lookup.min_length() {
                        continue;
                    }
                    match lookup.source() {
                        ListSource::Items(items) => {
                            let matched: Vec<SourceItem> =
                                items.iter().filter(|item| lookup.matches(item, search)).cloned().collect();
                            if !matched.is_empty() {
                                let options = to_suggestions(ds, lookup, &matched);
                                buckets = buckets.merge_into(&category, index, options, Some(lookup.limit(config.default_item_limit())));
                            }
                        }
                        ListSource::Async(lookup_fn) => {
                            let query = LookupQuery {
                                text: search.to_owned(),
                                operator,
                                matchers: ctx.matchers.to_vec(),
                            };
                            resolution.pending.push(LookupRequest::new(
                                generation,
                                token,
                                ds.name(),
                                index,
                                query,
                                config.promise_delay(),
                                lookup_fn.clone(),
                            ));
                            if config.shows_when_searching() {
                                buckets = buckets.with_placeholder(&category);
                            }
                        }
                    }
                }
                Definition::Expression(expression) => {
                    if expression.is_match(search) {
                        let value = expression.derive(search);
                        let text = value.to_string();
                        buckets = buckets.merge_into(&category, index, vec![Suggestion::new(ds.name(), value, text)], None);
                    }
                }
            }
        }
    }
    debug!(search, buckets = buckets.len(), pending = resolution.pending.len(), "resolved");
    resolution.buckets = buckets;
    resolution
}

/// Folds an async result into the buckets. Returns `None` when nothing changed.
///
/// Staleness is the caller's concern; this only knows how to merge.
pub fn merge_lookup(buckets: Buckets, result: &LookupResult, config: &Config) -> Option<Buckets> {
    let position = config.source_position(&result.source)?;
    let ds = &config.data_sources()[position];
    let Some(Definition::List(lookup)) = ds.definitions().get(result.definition) else {
        return None;
    };
    let category = Category::of(ds, position);
    if !result.items.is_empty() {
        let options = to_suggestions(ds, lookup, &result.items);
        return Some(buckets.merge_into(&category, result.definition, options, Some(lookup.limit(config.default_item_limit()))));
    }
    if config.shows_when_searching() {
        let (buckets, changed) = buckets.without_placeholder(ds.title());
        if changed {
            return Some(buckets);
        }
    }
    None
}

/// Tokenize, resolve and aggregate in one go.
///
/// Async sources show up only as `pending` requests (and placeholders, if
/// configured); they are tied to a private generation that nothing else advances.
pub fn suggest(text: &str, ctx: &ResolveContext<'_>) -> Suggestions {
    let tokens = tokenizer::tokenize(text, ctx.config, ctx.function);
    if tokens.free_text || tokens.bracket.is_some() {
        return Suggestions { tokens, ..Suggestions::default() };
    }
    let generation = Generation::new();
    let token = generation.advance();
    let resolution = resolve(&tokens.remainder, tokens.operator, ctx, &generation, token);
    let total = resolution.buckets.total();
    Suggestions { tokens, buckets: resolution.buckets, total, pending: resolution.pending }
}
