use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use querybox::aggregate::{Buckets, Category, Suggestion};
use querybox::brackets::find_unbalanced;
use querybox::resolver::{suggest, ResolveContext};
use querybox::sequence::QueryBox;
use querybox::settings::{Config, NUMBER_COMPARISONS, STRING_COMPARISONS};
use querybox::source::{DataSource, ExpressionLookup, ListLookup};
use querybox::tokenizer::tokenize;

fn config(items: usize) -> Config {
    let words = (0..items).map(|n| format!("item {n:07}"));
    Config::new(vec![
        DataSource::new("words", "Words", STRING_COMPARISONS.iter().copied())
            .definition(ListLookup::items(words).ignore_case()),
        DataSource::new("number", "Numbers", NUMBER_COMPARISONS.iter().copied())
            .precedence(1)
            .definition(ExpressionLookup::regex(r"^\d+$", |t: &str| t.parse::<f64>().unwrap_or_default().into()).unwrap()),
    ])
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let small = config(1_000);
    c.bench_function("tokenize", |b| b.iter(|| tokenize(black_box("or >= 0000123"), &small, None)));

    for (label, items) in [("suggest 1k", 1_000), ("suggest 100k", 100_000)] {
        let config = config(items);
        let ctx = ResolveContext::new(&config);
        c.bench_function(label, |b| b.iter(|| suggest(black_box("ITEM 00001"), &ctx)));
    }

    let categories: Vec<(Category, Vec<Suggestion>)> = (0..50)
        .map(|n| {
            let ds = DataSource::new(format!("s{n}"), format!("S{n}"), ["="]).precedence(n % 7);
            let options = (0..20).map(|i| Suggestion::new(ds.name(), i as f64, format!("{i}"))).collect();
            (Category::of(&ds, n as usize), options)
        })
        .collect();
    c.bench_function("merge 50 categories", |b| {
        b.iter(|| {
            categories
                .iter()
                .fold(Buckets::new(), |buckets, (category, options)| buckets.merge_into(category, 0, options.clone(), Some(10)))
        })
    });

    let comparisons: Vec<&str> = (0..10_000).map(|n| match n % 5 { 0 => "(", 4 => ")", _ => "=" }).collect();
    c.bench_function("brackets 10k", |b| b.iter(|| find_unbalanced(black_box(&comparisons))));

    let shared = Arc::new(config(10_000));
    c.bench_function("type and commit", |b| {
        b.iter(|| {
            let mut query = QueryBox::new(Arc::clone(&shared));
            for text in ["i", "it", "ite", "item 000004"] {
                query.input(text);
            }
            query.choose(0, false);
            query.matchers().len()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
