use std::sync::Arc;

use querybox::construct::{Matcher, Operator};
use querybox::edit::{Key, KeyEvent, KeyResult};
use querybox::sequence::{QueryBox, Response};
use querybox::settings::{Config, LimitPolicy, OperatorMode, STRING_COMPARISONS};
use querybox::source::{DataSource, ExpressionLookup, ListLookup};
use querybox::validate::validate_matcher;

fn colours(limit: usize) -> DataSource {
    DataSource::new("colour", "Colours", STRING_COMPARISONS.iter().copied())
        .selection_limit(limit)
        .definition(ListLookup::items(["red", "green", "blue"]))
}

fn enter(query: &mut QueryBox, text: &str) -> Response {
    query.input(text);
    query.key(KeyEvent::new(Key::Enter))
}

fn texts(query: &QueryBox) -> Vec<&str> {
    query.matchers().iter().map(Matcher::text).collect()
}

#[test]
fn third_selection_is_refused_until_one_is_removed() {
    let mut query = QueryBox::new(Arc::new(Config::new(vec![colours(2)])));
    assert_eq!(enter(&mut query, "red"), Response::Edit(KeyResult::Committed));
    assert_eq!(enter(&mut query, "green"), Response::Edit(KeyResult::Committed));

    assert_eq!(enter(&mut query, "blue"), Response::Edit(KeyResult::Handled));
    assert_eq!(query.edit().error(), Some("Datasource (Colours) is limited to 2 items."));
    assert_eq!(texts(&query), ["red", "green"], "a refused candidate never enters the sequence");

    let first = query.matchers()[0].key().to_owned();
    assert!(query.delete(&first));
    assert_eq!(enter(&mut query, "blue"), Response::Edit(KeyResult::Committed));
    assert_eq!(texts(&query), ["green", "blue"]);
    assert_eq!(query.edit().error(), None);
}

#[test]
fn editing_at_the_limit_replaces_rather_than_adds() {
    let mut query = QueryBox::new(Arc::new(Config::new(vec![colours(2)])));
    enter(&mut query, "red");
    enter(&mut query, "green");
    query.select(0);
    assert_eq!(query.edit().text(), "=red");
    assert_eq!(enter(&mut query, "blue"), Response::Edit(KeyResult::Committed));
    assert_eq!(texts(&query), ["blue", "green"]);
    assert_eq!(query.active_index(), None, "the edit closes after an update");
}

#[test]
fn or_groups_share_one_selection_when_configured() {
    let config = Config::new(vec![colours(1)]).with_limit_policy(LimitPolicy::OrGroup);
    let mut query = QueryBox::new(Arc::new(config));
    enter(&mut query, "red");
    assert_eq!(enter(&mut query, "or green"), Response::Edit(KeyResult::Committed));
    assert_eq!(query.matchers()[1].operator(), Operator::Or);
    assert_eq!(enter(&mut query, "blue"), Response::Edit(KeyResult::Handled));
    assert_eq!(query.edit().error(), Some("Datasource (Colours) is limited to 1 items."));

    let mut individual = QueryBox::new(Arc::new(Config::new(vec![colours(1)])));
    enter(&mut individual, "red");
    assert_eq!(enter(&mut individual, "or green"), Response::Edit(KeyResult::Handled));
}

#[test]
fn comparison_must_be_legal_for_the_source() {
    let config = Config::new(vec![
        DataSource::new("code", "Codes", ["=", "!"]).definition(ListLookup::items(["abc"])),
        DataSource::new("wide", "Wide", ["*"]),
    ]);
    let mut query = QueryBox::new(Arc::new(config));
    assert_eq!(enter(&mut query, "* abc"), Response::Edit(KeyResult::Handled));
    assert_eq!(query.edit().error(), Some("Comparison (*) isn't valid for code."));
    assert!(query.matchers().is_empty());
}

#[test]
fn regex_sources_take_equality_only() {
    let digits = ExpressionLookup::regex(r"^\d+$", |t: &str| t.into()).unwrap();
    let config = Config::new(vec![DataSource::new("id", "Ids", STRING_COMPARISONS.iter().copied()).definition(digits)]);
    let mut query = QueryBox::new(Arc::new(config));
    assert_eq!(enter(&mut query, "* 123"), Response::Edit(KeyResult::Handled));
    assert_eq!(query.edit().error(), Some("Comparison (*) isn't valid for regex."));
    assert_eq!(enter(&mut query, "! 123"), Response::Edit(KeyResult::Committed));
    assert_eq!(query.matchers()[0].comparison(), "!");
}

#[test]
fn extra_validator_runs_after_builtin_checks() {
    let config = Config::new(vec![colours(5)]);
    let mut query = QueryBox::new(Arc::new(config))
        .with_validator(|m| (m.text() == "blue").then(|| "blue is sold out".to_owned()));
    assert_eq!(enter(&mut query, "blue"), Response::Edit(KeyResult::Handled));
    assert_eq!(query.edit().error(), Some("blue is sold out"));
    assert_eq!(enter(&mut query, "red"), Response::Edit(KeyResult::Committed));
}

#[test]
fn validation_is_idempotent() {
    let sources = [colours(1)];
    let existing = vec![Matcher::new("m1", Operator::And, "=", "colour", "red", "red")];
    let candidate = Matcher::new("m2", Operator::And, "=", "colour", "blue", "blue");
    let first = validate_matcher(&candidate, &existing, &sources, None, OperatorMode::Complex, LimitPolicy::Individual);
    let second = validate_matcher(&candidate, &existing, &sources, None, OperatorMode::Complex, LimitPolicy::Individual);
    assert_eq!(first, second);
    assert!(first.is_some());
    assert_eq!(existing.len(), 1);
    assert_eq!(
        validate_matcher(&candidate, &existing, &sources, Some(0), OperatorMode::Complex, LimitPolicy::Individual),
        None,
        "substituting the edited slot stays within the limit"
    );
}
