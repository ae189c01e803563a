use std::sync::Arc;

use querybox::aggregate::{Buckets, Category, Suggestion, FUNCTIONS_TEXT};
use querybox::datatype::SourceItem;
use querybox::interface::resolve_all;
use querybox::resolver::{suggest, ResolveContext};
use querybox::sequence::QueryBox;
use querybox::settings::{Config, STRING_COMPARISONS};
use querybox::source::{DataSource, Function, ListLookup, LookupQuery};

fn listed(name: &str, title: &str, precedence: Option<i64>) -> DataSource {
    let ds = DataSource::new(name, title, STRING_COMPARISONS.iter().copied())
        .definition(ListLookup::items([format!("{name}-x"), format!("{name}-y")]));
    match precedence {
        Some(precedence) => ds.precedence(precedence),
        None => ds,
    }
}

fn delayed(name: &str, title: &str, precedence: i64) -> DataSource {
    let prefix = name.to_owned();
    DataSource::new(name, title, STRING_COMPARISONS.iter().copied())
        .precedence(precedence)
        .definition(ListLookup::future(move |query: LookupQuery| {
            let item = SourceItem::from(format!("{}-{}", prefix, query.text));
            async move { vec![item] }
        }))
}

#[test]
fn higher_precedence_comes_first() {
    let config = Config::new(vec![
        listed("a", "Three", Some(3)),
        listed("b", "One", Some(1)),
        listed("c", "Two", Some(2)),
    ]);
    let suggestions = suggest("x", &ResolveContext::new(&config));
    assert_eq!(suggestions.buckets.titles(), ["Three", "Two", "One"]);
}

#[test]
fn equal_precedence_keeps_configuration_order() {
    let config = Config::new(vec![
        listed("a", "First", None),
        listed("b", "Second", Some(0)),
        listed("c", "Ranked", Some(1)),
        listed("d", "Negative", Some(-1)),
    ]);
    let suggestions = suggest("x", &ResolveContext::new(&config));
    assert_eq!(suggestions.buckets.titles(), ["Ranked", "First", "Second", "Negative"]);
}

#[test]
fn functions_head_the_list() {
    let config = Config::new(vec![listed("fx", "Top", Some(100))]).with_functions(vec![Function::new("fx-report")]);
    let ctx = ResolveContext { allow_functions: true, ..ResolveContext::new(&config) };
    let suggestions = suggest("fx", &ctx);
    assert_eq!(suggestions.buckets.titles(), [FUNCTIONS_TEXT, "Top"]);
}

#[test]
fn merge_order_never_changes_the_result() {
    let sources = [listed("a", "A", Some(2)), listed("b", "B", None), listed("c", "C", Some(2))];
    let batches: Vec<(Category, Vec<Suggestion>)> = sources
        .iter()
        .enumerate()
        .map(|(position, ds)| {
            let options = vec![Suggestion::new(ds.name(), ds.name(), ds.name())];
            (Category::of(ds, position), options)
        })
        .collect();
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let merged: Vec<Buckets> = orders
        .iter()
        .map(|order| {
            order.iter().fold(Buckets::new(), |buckets, &i| {
                let (category, options) = &batches[i];
                buckets.merge_into(category, 0, options.clone(), Some(10))
            })
        })
        .collect();
    for buckets in &merged[1..] {
        assert_eq!(buckets, &merged[0]);
    }
    assert_eq!(merged[0].titles(), ["A", "C", "B"]);
}

#[tokio::test(start_paused = true)]
async fn async_answers_land_in_rank_order_whatever_their_arrival() {
    let config = Arc::new(Config::new(vec![
        delayed("low", "Low", 1),
        listed("mid", "Mid", Some(5)),
        delayed("high", "High", 9),
    ]));

    let mut settled = Vec::new();
    for reversed in [false, true] {
        let mut query = QueryBox::new(Arc::clone(&config));
        let pending = query.input("x");
        assert_eq!(pending.len(), 2);
        let mut results = resolve_all(pending).await;
        if reversed {
            results.reverse();
        }
        for result in &results {
            assert!(query.apply_lookup(result));
        }
        settled.push(query.edit().buckets().clone());
    }
    assert_eq!(settled[0], settled[1]);
    assert_eq!(settled[0].titles(), ["High", "Mid", "Low"]);
}

fn fixed(items: &'static [&'static str]) -> ListLookup {
    ListLookup::future(move |_: LookupQuery| async move { items.iter().copied().map(SourceItem::from).collect() }).item_limit(2)
}

#[tokio::test(start_paused = true)]
async fn capped_definitions_of_one_source_merge_the_same_either_way() {
    let split = DataSource::new("split", "Split", STRING_COMPARISONS.iter().copied())
        .definition(fixed(&["a", "b", "e"]))
        .definition(fixed(&["c", "d"]));
    let config = Arc::new(Config::new(vec![split]));

    let mut settled = Vec::new();
    for reversed in [false, true] {
        let mut query = QueryBox::new(Arc::clone(&config));
        let mut results = resolve_all(query.input("x")).await;
        assert_eq!(results.len(), 2);
        if reversed {
            results.reverse();
        }
        for result in &results {
            assert!(query.apply_lookup(result));
        }
        settled.push(query.edit().buckets().clone());
    }
    assert_eq!(settled[0], settled[1]);
    let texts: Vec<&str> = settled[0].bucket("Split").unwrap().options().iter().map(|o| o.text.as_str()).collect();
    assert_eq!(texts, ["a", "b"], "the first definition's items lead, capped at the definition limit");
}
