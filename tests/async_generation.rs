use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use querybox::construct::{Matcher, Operator};
use querybox::datatype::SourceItem;
use querybox::edit::{Key, KeyEvent};
use querybox::interface::{run_lookup, LookupRunner};
use querybox::sequence::{QueryBox, Response};
use querybox::settings::{Config, STRING_COMPARISONS};
use querybox::source::{DataSource, ListLookup, LookupQuery};

// shorter text answers slower, so older lookups finish last
fn remote(calls: Arc<AtomicUsize>) -> Config {
    let lookup = ListLookup::future(move |query: LookupQuery| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let wait = 400 - 100 * query.text.len() as u64;
            tokio::time::sleep(Duration::from_millis(wait)).await;
            vec![SourceItem::from(format!("{}-hit", query.text))]
        }
    });
    Config::new(vec![DataSource::new("remote", "Remote", STRING_COMPARISONS.iter().copied()).definition(lookup)])
        .with_promise_delay(Duration::from_millis(5))
}

fn texts(query: &QueryBox) -> Vec<String> {
    query
        .edit()
        .buckets()
        .iter()
        .flat_map(|b| b.options().iter().map(|o| o.text.clone()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_text_lands() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = QueryBox::new(Arc::new(remote(Arc::clone(&calls))));
    let (runner, mut results) = LookupRunner::new();

    for text in ["a", "ab", "abc"] {
        runner.submit_all(query.input(text)).expect("runner alive");
        // let the debounce pass so every lookup is actually in flight
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(runner);

    let mut applied = 0;
    while let Some(result) = results.recv().await {
        if query.apply_lookup(&result) {
            applied += 1;
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3, "every lookup was issued");
    assert_eq!(applied, 1, "stale answers never reach the session");
    assert_eq!(texts(&query), ["abc-hit"]);
}

#[tokio::test(start_paused = true)]
async fn superseded_requests_are_never_issued() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = QueryBox::new(Arc::new(remote(Arc::clone(&calls))));
    let (runner, mut results) = LookupRunner::new();

    // typed faster than the debounce
    for text in ["a", "ab", "abc"] {
        runner.submit_all(query.input(text)).expect("runner alive");
    }
    drop(runner);

    let mut received = Vec::new();
    while let Some(result) = results.recv().await {
        received.push(result);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the newest request survives its delay");
    assert_eq!(received.len(), 1);
    assert!(query.apply_lookup(&received[0]));
    assert_eq!(texts(&query), ["abc-hit"]);
}

#[tokio::test(start_paused = true)]
async fn a_fresh_result_turns_stale_after_typing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = QueryBox::new(Arc::new(remote(calls)));
    let mut pending = query.input("ab");
    assert_eq!(pending.len(), 1);
    let result = run_lookup(pending.remove(0)).await.expect("still current");

    query.input("abx");
    assert!(!query.apply_lookup(&result), "token no longer matches");
    assert!(texts(&query).is_empty());
}

#[tokio::test(start_paused = true)]
async fn placeholder_holds_the_category_while_searching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = remote(calls).show_when_searching(true);
    let mut query = QueryBox::new(Arc::new(config));
    let pending = query.input("abc");
    assert_eq!(query.edit().buckets().titles(), ["Remote"]);
    assert!(query.edit().buckets().bucket("Remote").unwrap().is_placeholder());
    assert_eq!(query.edit().total(), 1, "a loading row is one navigation stop");

    for request in pending {
        let result = run_lookup(request).await.expect("current");
        assert!(query.apply_lookup(&result));
    }
    assert_eq!(texts(&query), ["abc-hit"]);
}

#[tokio::test(start_paused = true)]
async fn switching_matchers_supersedes_the_old_box() {
    let calls = Arc::new(AtomicUsize::new(0));
    let preloaded = vec![Matcher::new("a", Operator::And, "=", "remote", "x", "x")];
    let mut query = QueryBox::new(Arc::new(remote(Arc::clone(&calls)))).with_matchers(preloaded);

    query.input("o");
    let mut pending = query.input("ol");
    let fresh = run_lookup(pending.remove(0)).await.expect("current when it ran");
    let late = query.input("ol");

    assert_eq!(query.key(KeyEvent::new(Key::ArrowLeft).at(0)), Response::Edit(querybox::edit::KeyResult::Handled));
    assert_eq!(query.active_index(), Some(0));
    query.input("n");
    query.input("ne");

    assert!(!query.apply_lookup(&fresh), "an answer for the trailing box never lands in the matcher's box");
    for request in late {
        assert!(run_lookup(request).await.is_none(), "issued by a replaced box");
    }
    assert!(texts(&query).is_empty());
}

#[tokio::test(start_paused = true)]
async fn results_only_apply_to_the_box_that_asked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = Arc::new(remote(calls));
    let mut asking = QueryBox::new(Arc::clone(&config));
    let mut other = QueryBox::new(config);
    let mut pending = other.input("ab");
    asking.input("ab");
    let result = run_lookup(pending.remove(0)).await.expect("current");
    assert!(!asking.apply_lookup(&result), "same token, different generation");
    assert!(other.apply_lookup(&result));
}
