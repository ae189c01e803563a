//! The edit-state controller behind a single edit box.
//!
//! An [`EditSession`] either edits an existing matcher or is the perpetual
//! trailing box that appends new ones. Every text change advances the
//! session's [`Generation`] and recomputes operator, comparison, search text
//! and options from scratch. Async lookups come back as [`LookupRequest`]s
//! for the caller to run; their results go through [`EditSession::apply_lookup`],
//! which drops anything issued for older text.
//!
//! The session never owns the sequence. Everything it wants done to it is
//! requested through an [`EditHandler`].

use tracing::debug;

use crate::aggregate::{Buckets, Suggestion};
use crate::construct::{Bracket, FREE_TEXT, KeyGenerator, Matcher, Operator};
use crate::interface::{Generation, LookupRequest, LookupResult};
use crate::resolver::{self, ResolveContext};
use crate::settings::{Config, OperatorMode};
use crate::source::Function;
use crate::tokenizer;

/// What an edit session asks of whoever owns the sequence.
///
/// Every method has a no-op default, so a standalone box only implements
/// what it cares about.
pub trait EditHandler {
    /// A matcher was confirmed, or `None` when the edited matcher should go.
    fn matcher_changed(&mut self, _matcher: Option<Matcher>) {}
    /// Last word before a candidate is committed; an error blocks it.
    /// `inserting` means the candidate joins the sequence rather than replacing the edited matcher.
    fn validate(&mut self, _matcher: &Matcher, _inserting: bool) -> Option<String> {
        None
    }
    /// Insert before the edited matcher, or append from the trailing box.
    fn insert_matcher(&mut self, _matcher: Matcher) {}
    fn edit_previous(&mut self, _deleting: bool) {}
    fn edit_next(&mut self) {}
    fn focus(&mut self) {}
    fn cancel(&mut self) {}
    /// Fired once per session, on the first divergent keystroke.
    fn changing(&mut self) {}
    fn set_active_function(&mut self, _function: &Function) {}
    fn delete_active_function(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    PageUp,
    PageDown,
    Home,
    End,
    Enter,
    Tab,
    Backspace,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
    pub ctrl: bool,
    /// Caret position in characters.
    pub cursor: usize,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self { key, shift: false, ctrl: false, cursor: 0 }
    }
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }
    pub fn at(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }
    fn plain(&self) -> bool {
        !self.shift && !self.ctrl
    }
}

/// What a key press amounted to. `Ignored` keys are the owner's to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    Ignored,
    Handled,
    Committed,
    Cancelled,
}

impl KeyResult {
    pub fn is_handled(&self) -> bool {
        *self != KeyResult::Ignored
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Typing,
    OptionsOpen,
    Committed,
    Cancelled,
}

/// The surroundings an edit session reads on every call.
#[derive(Debug, Clone, Copy)]
pub struct EditContext<'a> {
    pub config: &'a Config,
    pub matchers: &'a [Matcher],
    pub function: Option<&'a Function>,
    pub keys: &'a KeyGenerator,
}

impl<'a> EditContext<'a> {
    pub fn new(config: &'a Config, keys: &'a KeyGenerator) -> Self {
        Self { config, matchers: &[], function: None, keys }
    }
    fn resolve_context(&self, allow_functions: bool) -> ResolveContext<'a> {
        ResolveContext {
            config: self.config,
            function: self.function,
            matchers: self.matchers,
            allow_functions,
        }
    }
}

enum Choice {
    Option(Suggestion),
    Bracket(Bracket),
}

#[derive(Debug, Clone)]
pub struct EditSession {
    matcher: Option<Matcher>,
    first: bool,
    allow_functions: bool,
    allow_free_text: bool,
    text: String,
    operator: Option<Operator>,
    comparison: Option<String>,
    match_text: Option<String>,
    generation: Generation,
    buckets: Buckets,
    active_option: Option<usize>,
    error: Option<String>,
    notified_changing: bool,
    outcome: Option<EditState>,
}

fn initial_text(matcher: &Matcher, first: bool, mode: OperatorMode) -> String {
    let mut text = String::new();
    if !first && mode != OperatorMode::Simple && matcher.operator() != Operator::None {
        text.push_str(matcher.operator().name());
        text.push(' ');
    }
    text.push_str(matcher.comparison());
    text.push_str(matcher.text());
    text
}

impl EditSession {
    /// The trailing box that appends new matchers.
    pub fn new(first: bool, allow_functions: bool, allow_free_text: bool) -> Self {
        Self {
            matcher: None,
            first,
            allow_functions,
            allow_free_text,
            text: String::new(),
            operator: None,
            comparison: None,
            match_text: None,
            generation: Generation::new(),
            buckets: Buckets::new(),
            active_option: None,
            error: None,
            notified_changing: false,
            outcome: None,
        }
    }

    /// A box editing `matcher` in place, pre-filled with its text.
    pub fn editing(matcher: Matcher, first: bool, mode: OperatorMode, allow_free_text: bool) -> Self {
        let mut session = Self::new(first, false, allow_free_text);
        session.text = initial_text(&matcher, first, mode);
        session.operator = Some(matcher.operator());
        session.comparison = Some(matcher.comparison().to_owned());
        session.matcher = Some(matcher);
        session
    }

    /// Draws tokens from a generation shared with other sessions, so tokens
    /// never repeat across the sessions of one sequence.
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }
    pub fn is_editing(&self) -> bool {
        self.matcher.is_some()
    }
    pub fn first(&self) -> bool {
        self.first
    }
    pub fn allows_functions(&self) -> bool {
        self.allow_functions
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }
    pub fn comparison(&self) -> Option<&str> {
        self.comparison.as_deref()
    }
    /// Search text left after the prefixes; `None` before any text was parsed.
    pub fn match_text(&self) -> Option<&str> {
        self.match_text.as_deref()
    }
    pub fn generation(&self) -> &Generation {
        &self.generation
    }
    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }
    pub fn total(&self) -> usize {
        self.buckets.total()
    }
    pub fn active_option(&self) -> Option<usize> {
        self.active_option
    }
    pub fn active_suggestion(&self) -> Option<&Suggestion> {
        self.active_option.and_then(|index| self.buckets.get(index))
    }
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn state(&self) -> EditState {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if self.text.is_empty() {
            EditState::Idle
        } else if !self.buckets.is_empty() {
            EditState::OptionsOpen
        } else {
            EditState::Typing
        }
    }

    /// Updates the trailing box's position flags as the sequence around it changes.
    pub fn place(&mut self, first: bool, allow_functions: bool, allow_free_text: bool) {
        if first != self.first {
            self.error = None;
        }
        self.first = first;
        self.allow_functions = allow_functions;
        self.allow_free_text = allow_free_text;
    }

    pub fn focus(&mut self, handler: &mut impl EditHandler) {
        handler.focus();
    }

    /// Moves the highlight, e.g. on hover. Out-of-range indices are ignored.
    pub fn highlight(&mut self, index: usize) {
        if index < self.total() {
            self.active_option = Some(index);
        }
    }

    /// Takes new box text and recomputes everything from it.
    ///
    /// Returns the async lookups to run for this text.
    pub fn set_text(&mut self, text: &str, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> Vec<LookupRequest> {
        self.outcome = None;
        self.operator = None;
        self.comparison = None;
        self.match_text = None;
        if !self.notified_changing && self.matcher.is_some() && text != self.text {
            self.notified_changing = true;
            handler.changing();
        }
        let token = self.generation.advance();
        self.text = text.to_owned();

        let mut buckets = Buckets::new();
        let mut pending = Vec::new();
        let tokens = tokenizer::tokenize(&self.text, ctx.config, ctx.function);
        if !tokens.free_text && !tokens.is_empty() {
            self.operator = tokens.operator;
            self.comparison = tokens.comparison.clone();
            if let Some(bracket) = tokens.bracket {
                self.buckets = Buckets::new();
                self.update_state();
                self.bracket(bracket, ctx, handler);
                return Vec::new();
            }
            if !tokens.remainder.is_empty() {
                let resolution = resolver::resolve(
                    &tokens.remainder,
                    tokens.operator,
                    &ctx.resolve_context(self.allow_functions),
                    &self.generation,
                    token,
                );
                buckets = resolution.buckets;
                pending = resolution.pending;
            }
            self.match_text = Some(tokens.remainder);
        }
        self.buckets = buckets;
        self.update_state();
        pending
    }

    /// Rebuilds the text from a picked operator and/or comparison, keeping the search text.
    pub fn compose(
        &mut self,
        operator: Option<Operator>,
        comparison: Option<&str>,
        ctx: &EditContext<'_>,
        handler: &mut impl EditHandler,
    ) -> Vec<LookupRequest> {
        let mut line = String::new();
        if let Some(operator) = operator.or(self.operator).filter(|op| *op != Operator::None) {
            line.push_str(operator.name());
            line.push(' ');
        }
        if let Some(comparison) = comparison.map(str::to_owned).or_else(|| self.comparison.clone()) {
            line.push_str(&comparison);
            line.push(' ');
        }
        line.push_str(self.match_text.as_deref().unwrap_or_default());
        self.set_text(&line, ctx, handler)
    }

    /// Folds an async result in, unless newer text superseded it.
    pub fn apply_lookup(&mut self, result: &LookupResult, config: &Config) -> bool {
        if result.origin != self.generation || !self.generation.is_current(result.token) {
            debug!(source = %result.source, token = result.token, "ignoring stale lookup result");
            return false;
        }
        match resolver::merge_lookup(self.buckets.clone(), result, config) {
            Some(buckets) => {
                self.buckets = buckets;
                self.update_state();
                debug!(source = %result.source, items = result.items.len(), "applied lookup result");
                true
            }
            None => false,
        }
    }

    pub fn key(&mut self, event: KeyEvent, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> KeyResult {
        self.error = None;
        self.outcome = None;
        let result = match event.key {
            Key::ArrowLeft if event.plain() && event.cursor == 0 => {
                handler.edit_previous(false);
                KeyResult::Handled
            }
            Key::ArrowRight if event.plain() && event.cursor >= self.text.chars().count() => {
                handler.edit_next();
                KeyResult::Handled
            }
            Key::ArrowUp => self.step(false),
            Key::ArrowDown => self.step(true),
            Key::PageUp => self.page(false),
            Key::PageDown => self.page(true),
            Key::Home => self.jump(false),
            Key::End => self.jump(true),
            Key::Enter | Key::Tab => self.confirm(event, ctx, handler),
            Key::Backspace if self.text.is_empty() => self.backspace(event, handler),
            Key::Escape if self.matcher.is_some() => {
                handler.cancel();
                KeyResult::Cancelled
            }
            Key::Escape if !self.text.is_empty() => {
                self.reset();
                KeyResult::Cancelled
            }
            _ => KeyResult::Ignored,
        };
        match result {
            KeyResult::Committed => self.outcome = Some(EditState::Committed),
            KeyResult::Cancelled => self.outcome = Some(EditState::Cancelled),
            _ => {}
        }
        result
    }

    /// Commits the option at a navigation slot, or inserts it before the edited matcher.
    pub fn select(&mut self, index: usize, insert: bool, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> KeyResult {
        let Some(option) = self.buckets.get(index).cloned() else {
            return KeyResult::Ignored;
        };
        if option.is_function() {
            return match ctx.config.function(&option.text) {
                Some(function) => {
                    handler.set_active_function(function);
                    self.reset();
                    KeyResult::Handled
                }
                None => KeyResult::Ignored,
            };
        }
        self.commit(Choice::Option(option), insert, ctx, handler)
    }

    /// Clears the box and invalidates any lookup still in flight for it.
    pub fn reset(&mut self) {
        self.generation.advance();
        self.text.clear();
        self.operator = None;
        self.comparison = None;
        self.match_text = None;
        self.buckets = Buckets::new();
        self.active_option = None;
    }

    fn restore(&mut self, mode: OperatorMode) {
        self.generation.advance();
        self.buckets = Buckets::new();
        self.active_option = None;
        self.match_text = None;
        if let Some(matcher) = &self.matcher {
            self.text = initial_text(matcher, self.first, mode);
            self.operator = Some(matcher.operator());
            self.comparison = Some(matcher.comparison().to_owned());
        }
    }

    fn update_state(&mut self) {
        if self.text.is_empty() {
            self.active_option = None;
            return;
        }
        let total = self.buckets.total();
        if total > 0 {
            self.active_option = match self.active_option {
                None => Some(0),
                Some(index) if index >= total => Some(total - 1),
                keep => keep,
            };
        }
    }

    fn step(&mut self, forward: bool) -> KeyResult {
        let total = self.total();
        if total == 0 {
            return KeyResult::Ignored;
        }
        self.active_option = Some(match (self.active_option, forward) {
            (None, true) => 0,
            (None, false) => total - 1,
            (Some(index), true) if index + 1 < total => index + 1,
            (Some(_), true) => 0,
            (Some(index), false) if index > 0 => index - 1,
            (Some(_), false) => total - 1,
        });
        KeyResult::Handled
    }

    fn page(&mut self, forward: bool) -> KeyResult {
        let total = self.total();
        if total == 0 {
            return KeyResult::Ignored;
        }
        let from = self.active_option.unwrap_or(if forward { total - 1 } else { 0 });
        self.active_option = Some(self.buckets.category_start(from, forward));
        KeyResult::Handled
    }

    fn jump(&mut self, end: bool) -> KeyResult {
        let total = self.total();
        if total == 0 {
            return KeyResult::Ignored;
        }
        self.active_option = Some(if end { total - 1 } else { 0 });
        KeyResult::Handled
    }

    fn confirm(&mut self, event: KeyEvent, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> KeyResult {
        if self.text.starts_with(FREE_TEXT) {
            return self.capture_free_text(ctx, handler);
        }
        if !self.buckets.is_empty() {
            if let Some(index) = self.active_option {
                // a loading row swallows the key rather than completing the sequence
                return match self.select(index, event.shift, ctx, handler) {
                    KeyResult::Ignored => KeyResult::Handled,
                    result => result,
                };
            }
        }
        if self.matcher.is_some() {
            if self.text.is_empty() {
                handler.matcher_changed(None);
                self.reset();
            } else {
                handler.cancel();
            }
            return KeyResult::Cancelled;
        }
        KeyResult::Ignored
    }

    fn backspace(&mut self, event: KeyEvent, handler: &mut impl EditHandler) -> KeyResult {
        if event.plain() {
            if self.matcher.is_none() && self.first {
                handler.delete_active_function();
            } else {
                handler.edit_previous(true);
            }
            return KeyResult::Handled;
        }
        if self.matcher.is_some() {
            handler.matcher_changed(None);
            self.reset();
            return KeyResult::Cancelled;
        }
        KeyResult::Ignored
    }

    fn capture_free_text(&mut self, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> KeyResult {
        if !self.allow_free_text {
            return KeyResult::Ignored;
        }
        let literal = &self.text[FREE_TEXT.len()..];
        let key = self.key_for(false, ctx);
        handler.matcher_changed(Some(Matcher::free_text(key, literal)));
        self.reset();
        KeyResult::Committed
    }

    fn bracket(&mut self, bracket: Bracket, ctx: &EditContext<'_>, handler: &mut impl EditHandler) {
        // typing a different bracket into an existing matcher opens or closes scope before it
        let inserts = self.matcher.as_ref().is_some_and(|m| m.comparison() != bracket.symbol());
        if inserts {
            let inserted = Matcher::bracket(ctx.keys.generate(), bracket, self.bracket_operator(bracket));
            debug!(key = inserted.key(), "inserting bracket before edited matcher");
            handler.insert_matcher(inserted);
            self.restore(ctx.config.operators());
        } else {
            self.commit(Choice::Bracket(bracket), false, ctx, handler);
        }
    }

    fn bracket_operator(&self, bracket: Bracket) -> Operator {
        match bracket {
            Bracket::Close => Operator::None,
            Bracket::Open => self.operator.unwrap_or(Operator::And),
        }
    }

    // an inserted matcher sits next to the edited one, so it never borrows its key
    fn key_for(&self, insert: bool, ctx: &EditContext<'_>) -> String {
        match &self.matcher {
            Some(matcher) if !insert => matcher.key().to_owned(),
            _ => ctx.keys.generate(),
        }
    }

    fn candidate(&self, choice: &Choice, insert: bool, ctx: &EditContext<'_>) -> Matcher {
        let key = self.key_for(insert, ctx);
        match choice {
            Choice::Bracket(bracket) => Matcher::bracket(key, *bracket, self.bracket_operator(*bracket)),
            Choice::Option(option) => Matcher::new(
                key,
                self.operator.unwrap_or(Operator::And),
                self.comparison.as_deref().unwrap_or(ctx.config.default_comparison()),
                option.source.clone(),
                option.value.clone(),
                option.text.clone(),
            ),
        }
    }

    fn validated(
        &mut self,
        choice: &Choice,
        insert: bool,
        ctx: &EditContext<'_>,
        handler: &mut impl EditHandler,
    ) -> Option<Matcher> {
        let candidate = self.candidate(choice, insert, ctx);
        if let Choice::Option(option) = choice {
            if let Some(ds) = ctx.config.source(&option.source) {
                if !ds.allows(candidate.comparison()) {
                    self.error = Some(format!("Comparison ({}) isn't valid for {}.", candidate.comparison(), ds.name()));
                    return None;
                }
            }
        }
        if let Some(error) = handler.validate(&candidate, insert) {
            debug!(key = candidate.key(), %error, "candidate rejected");
            self.error = Some(error);
            return None;
        }
        Some(candidate)
    }

    fn commit(&mut self, choice: Choice, insert: bool, ctx: &EditContext<'_>, handler: &mut impl EditHandler) -> KeyResult {
        let Some(matcher) = self.validated(&choice, insert, ctx, handler) else {
            return KeyResult::Handled;
        };
        if insert {
            handler.insert_matcher(matcher);
        } else {
            handler.matcher_changed(Some(matcher));
            self.reset();
        }
        KeyResult::Committed
    }
}
