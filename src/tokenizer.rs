//! Splits raw edit-box text into an operator prefix, a comparison prefix and
//! the remaining search text.

use tracing::trace;

use crate::construct::{Bracket, Operator, FREE_TEXT};
use crate::settings::Config;
use crate::source::Function;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokens {
    pub operator: Option<Operator>,
    pub comparison: Option<String>,
    /// Set when the text opens or closes a bracket instead of naming a value.
    pub bracket: Option<Bracket>,
    /// Search text left after the prefixes, or the literal after a leading quote.
    pub remainder: String,
    pub free_text: bool,
}

impl Tokens {
    pub fn is_empty(&self) -> bool {
        self.operator.is_none() && self.comparison.is_none() && self.bracket.is_none() && self.remainder.is_empty()
    }
}

// the first n characters, when there are that many
fn head(text: &str, n: usize) -> Option<&str> {
    match text.char_indices().nth(n) {
        Some((end, _)) => Some(&text[..end]),
        None if text.chars().count() == n => Some(text),
        None => None,
    }
}

// "orange" is a search, not `or` followed by "ange"
fn strip_word<'t>(text: &'t str, word: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(word)?;
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some(rest.trim_start()),
    }
}

fn strip_operator<'t>(text: &'t str, config: &Config) -> (Option<Operator>, &'t str) {
    if let Some(rest) = strip_word(text, "and") {
        return (Some(Operator::And), rest);
    }
    if let Some(rest) = strip_word(text, "or") {
        return (Some(Operator::Or), rest);
    }
    if let Some(symbol) = head(text, 1) {
        let rest = text[symbol.len()..].trim_start();
        if symbol == config.and_symbol() {
            return (Some(Operator::And), rest);
        }
        if symbol == config.or_symbol() {
            return (Some(Operator::Or), rest);
        }
    }
    (None, text)
}

pub fn tokenize(raw: &str, config: &Config, function: Option<&Function>) -> Tokens {
    let text = raw.trim();
    if text.is_empty() {
        return Tokens::default();
    }
    if let Some(literal) = raw.trim_start().strip_prefix(FREE_TEXT) {
        return Tokens {
            remainder: literal.to_owned(),
            free_text: true,
            ..Tokens::default()
        };
    }

    let mut tokens = Tokens::default();
    let mut rest = text;
    if config.detects_operators(function) {
        let (operator, stripped) = strip_operator(rest, config);
        tokens.operator = operator;
        rest = stripped;
    }

    // longest match first, so ">" never shadows ">="
    if let Some(pair) = head(rest, 2).filter(|pair| config.is_comparison(pair)) {
        tokens.comparison = Some(pair.to_owned());
        rest = rest[pair.len()..].trim_start();
    } else if let Some(first) = rest.chars().next() {
        let bracket = Bracket::from_char(first).filter(|_| config.detects_brackets(function));
        if let Some(bracket) = bracket {
            tokens.bracket = Some(bracket);
            rest = "";
        } else if let Some(single) = head(rest, 1).filter(|single| config.is_comparison(single)) {
            tokens.comparison = Some(single.to_owned());
            rest = rest[single.len()..].trim_start();
        }
    }
    tokens.remainder = rest.to_owned();
    trace!(operator = ?tokens.operator, comparison = ?tokens.comparison, bracket = ?tokens.bracket, remainder = %tokens.remainder, "tokenized");
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{OperatorMode, NUMBER_COMPARISONS, STRING_COMPARISONS};
    use crate::source::DataSource;

    fn config(mode: OperatorMode) -> Config {
        Config::new(vec![
            DataSource::new("text", "Text", STRING_COMPARISONS.iter().copied()),
            DataSource::new("number", "Number", NUMBER_COMPARISONS.iter().copied()),
        ])
        .with_operators(mode)
    }

    #[test]
    fn longest_comparison_wins() {
        let tokens = tokenize(">=5", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.comparison.as_deref(), Some(">="));
        assert_eq!(tokens.remainder, "5");
        let tokens = tokenize(">5", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.comparison.as_deref(), Some(">"));
    }

    #[test]
    fn operator_words_need_a_boundary() {
        let config = config(OperatorMode::Complex);
        for word in ["orange", "andes", "or2"] {
            let tokens = tokenize(word, &config, None);
            assert_eq!(tokens.operator, None, "{word}");
            assert_eq!(tokens.remainder, word);
        }
        let tokens = tokenize("or(", &config, None);
        assert_eq!(tokens.operator, Some(Operator::Or));
        let tokens = tokenize("and=red", &config, None);
        assert_eq!(tokens.operator, Some(Operator::And));
        assert_eq!(tokens.remainder, "red");
    }

    #[test]
    fn operator_words_and_symbols() {
        let config = config(OperatorMode::Complex);
        let tokens = tokenize("and != x", &config, None);
        assert_eq!(tokens.operator, Some(Operator::And));
        assert_eq!(tokens.comparison.as_deref(), Some("!"));
        assert_eq!(tokens.remainder, "= x");
        let tokens = tokenize("or * abc", &config, None);
        assert_eq!(tokens.operator, Some(Operator::Or));
        assert_eq!(tokens.comparison.as_deref(), Some("*"));
        assert_eq!(tokens.remainder, "abc");
        let tokens = tokenize("| abc", &config, None);
        assert_eq!(tokens.operator, Some(Operator::Or));
        assert_eq!(tokens.remainder, "abc");
        let tokens = tokenize("&abc", &config, None);
        assert_eq!(tokens.operator, Some(Operator::And));
    }

    #[test]
    fn simple_mode_never_reads_operators() {
        let tokens = tokenize("or abc", &config(OperatorMode::Simple), None);
        assert_eq!(tokens.operator, None);
        assert_eq!(tokens.remainder, "or abc");
    }

    #[test]
    fn function_can_forbid_operators_and_brackets() {
        let function = Function::new("f").no_and_or().no_brackets();
        let config = config(OperatorMode::Complex);
        let tokens = tokenize("and (", &config, Some(&function));
        assert_eq!(tokens.operator, None);
        assert_eq!(tokens.bracket, None);
        assert_eq!(tokens.remainder, "and (");
    }

    #[test]
    fn brackets_only_in_complex_mode() {
        let tokens = tokenize("(", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.bracket, Some(Bracket::Open));
        assert!(tokens.remainder.is_empty());
        let tokens = tokenize("or )", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.operator, Some(Operator::Or));
        assert_eq!(tokens.bracket, Some(Bracket::Close));
        let tokens = tokenize("(", &config(OperatorMode::AgGrid), None);
        assert_eq!(tokens.bracket, None);
        assert_eq!(tokens.remainder, "(");
    }

    #[test]
    fn quoted_text_is_left_alone() {
        let tokens = tokenize("\"and >= 5 ", &config(OperatorMode::Complex), None);
        assert!(tokens.free_text);
        assert_eq!(tokens.operator, None);
        assert_eq!(tokens.remainder, "and >= 5 ");
    }

    #[test]
    fn empty_remainder_is_valid() {
        let tokens = tokenize("and >=", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.comparison.as_deref(), Some(">="));
        assert_eq!(tokens.remainder, "");
        assert!(tokenize("   ", &config(OperatorMode::Complex), None).is_empty());
    }

    #[test]
    fn multibyte_text_does_not_split_characters() {
        let tokens = tokenize("é", &config(OperatorMode::Complex), None);
        assert_eq!(tokens.remainder, "é");
    }
}
