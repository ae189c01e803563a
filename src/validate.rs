//! Checks a candidate matcher against its source's constraints, and a whole
//! sequence against the active function.
//!
//! Matcher validation returns the message to show, or `None` when the
//! candidate may be committed. Nothing here mutates the sequence.

use crate::construct::{Matcher, Operator};
use crate::error::CompleteError;
use crate::settings::{LimitPolicy, OperatorMode};
use crate::source::{DataSource, Function};

/// Comparisons a regex-backed source accepts.
pub const EQUALITY_COMPARISONS: &[&str] = &["=", "!"];

// selections of `source` in a sequence, optionally folding or-joined runs into one
fn selections<'m>(sequence: impl Iterator<Item = &'m Matcher>, source: &str, or_groups: bool) -> usize {
    let mut count = 0;
    let mut previous: Option<&Matcher> = None;
    for m in sequence {
        if m.source() == source {
            let joined = or_groups
                && m.operator() == Operator::Or
                && previous.is_some_and(|p| p.source() == source);
            if !joined {
                count += 1;
            }
        }
        previous = Some(m);
    }
    count
}

/// Validates `candidate` as the matcher at `active_index` (or appended, when
/// `None`) of `existing`.
pub fn validate_matcher(
    candidate: &Matcher,
    existing: &[Matcher],
    sources: &[DataSource],
    active_index: Option<usize>,
    mode: OperatorMode,
    policy: LimitPolicy,
) -> Option<String> {
    if candidate.is_bracket() || candidate.is_free_text() {
        return None;
    }
    let ds = sources.iter().find(|ds| ds.name() == candidate.source())?;
    let comparison = candidate.comparison();
    if !ds.allows(comparison) {
        return Some(format!("Comparison ({}) isn't valid for {}.", comparison, ds.name()));
    }
    if ds.is_regex_backed() && !EQUALITY_COMPARISONS.contains(&comparison) {
        return Some(format!("Comparison ({}) isn't valid for regex.", comparison));
    }
    if let Some(limit) = ds.limit() {
        let or_groups = policy == LimitPolicy::OrGroup && mode != OperatorMode::Simple;
        let edited = active_index.filter(|&i| i < existing.len());
        let sequence: Vec<&Matcher> = match edited {
            Some(index) => existing
                .iter()
                .enumerate()
                .map(|(i, m)| if i == index { candidate } else { m })
                .collect(),
            None => existing.iter().chain(std::iter::once(candidate)).collect(),
        };
        if selections(sequence.into_iter(), ds.name(), or_groups) > limit {
            return Some(format!("Datasource ({}) is limited to {} items.", ds.title(), limit));
        }
    }
    None
}

/// Checks that every source the function requires is referenced, then runs
/// the function's own validator.
pub fn validate_function(function: &Function, matchers: &[Matcher]) -> Result<(), CompleteError> {
    let missing: Vec<String> = function
        .required_sources()
        .iter()
        .filter(|ds| !matchers.iter().any(|m| m.source() == ds.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CompleteError {
            function: function.name().to_owned(),
            message: format!("mandatory fields are missing ({})", missing.join(", ")),
            missing,
        });
    }
    if let Some(message) = function.check(matchers) {
        return Err(CompleteError {
            function: function.name().to_owned(),
            message,
            missing: Vec::new(),
        });
    }
    Ok(())
}
