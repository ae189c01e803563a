//! Flags unmatched brackets in a matcher sequence.
//!
//! Only the comparisons `(` and `)` take part in the scan; every other matcher
//! is transparent. The result is always recomputed from the whole sequence.

use crate::construct::{CLOSE_BRACKET, OPEN_BRACKET};

// one direction: push on `opening`, pop on `closing`, leftovers are unmatched
fn scan<'c>(indexed: impl Iterator<Item = (usize, &'c str)>, opening: &str, closing: &str) -> Vec<usize> {
    let mut stack = Vec::new();
    let mut unmatched = Vec::new();
    for (index, comparison) in indexed {
        if comparison == opening {
            stack.push(index);
        } else if comparison == closing && stack.pop().is_none() {
            unmatched.push(index);
        }
    }
    unmatched.extend(stack);
    unmatched
}

/// Indices of unmatched open and close brackets, ascending.
pub fn find_unbalanced<S: AsRef<str>>(comparisons: &[S]) -> Vec<usize> {
    let forward = comparisons.iter().map(AsRef::as_ref).enumerate();
    let mut flagged = scan(forward, OPEN_BRACKET, CLOSE_BRACKET);
    let backward = comparisons.iter().map(AsRef::as_ref).enumerate().rev();
    flagged.extend(scan(backward, CLOSE_BRACKET, OPEN_BRACKET));
    flagged.sort_unstable();
    flagged.dedup();
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_pairs_are_clean() {
        assert!(find_unbalanced(&["(", "=", ")"]).is_empty());
        assert!(find_unbalanced(&["(", "(", "=", ")", "!", ")"]).is_empty());
        assert!(find_unbalanced::<&str>(&[]).is_empty());
    }

    #[test]
    fn unmatched_open_and_close() {
        assert_eq!(find_unbalanced(&["(", "="]), [0]);
        assert_eq!(find_unbalanced(&["=", ")"]), [1]);
        assert_eq!(find_unbalanced(&[")", "(", "="]), [0, 1]);
        assert_eq!(find_unbalanced(&["(", "(", ")"]), [0]);
    }
}
