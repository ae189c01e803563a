//! The sequence controller.
//!
//! A [`QueryBox`] owns the ordered matcher sequence, the optional active
//! function and the one edit session currently open: either the trailing box
//! or a box editing the matcher at the active index. Input and key events go to
//! the edit session first; whatever it leaves unhandled is a sequence-level
//! command (reorder, select, delete, complete).
//!
//! Matchers are never mutated in place. Every change substitutes whole values,
//! then the bracket scan is rerun over the full sequence and observers are told.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::brackets::find_unbalanced;
use crate::construct::{Item, KeyGenerator, Matcher, OPEN_BRACKET, Operator};
use crate::edit::{EditContext, EditHandler, EditSession, Key, KeyEvent, KeyResult};
use crate::error::{CompleteError, QueryboxError, Result};
use crate::interface::{Generation, LookupRequest, LookupResult};
use crate::settings::{Config, OperatorMode};
use crate::source::Function;
use crate::validate::{validate_function, validate_matcher};

/// Transfer-type prefix of a dragged matcher; the key follows it.
pub const DRAG_PREFIX: &str = "querybox/";

pub type MatcherValidator = Arc<dyn Fn(&Matcher) -> Option<String> + Send + Sync>;
pub type Observer = Arc<dyn Fn(&[Matcher]) + Send + Sync>;

/// A dragged matcher as handed to the drag source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPayload {
    pub type_tag: String,
    pub data: String,
}

/// Reads a dragged matcher back.
pub fn parse_payload(data: &str) -> Result<Matcher> {
    Ok(serde_json::from_str(data)?)
}

/// The sequence handed out by a successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub matchers: Vec<Matcher>,
    pub function: Option<String>,
}

/// What a key press did to the whole box.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ignored,
    /// Consumed by the edit session.
    Edit(KeyResult),
    /// A sequence-level command ran.
    Handled,
    Completed(Completion),
    Incomplete(CompleteError),
}

enum Request {
    Changed(Option<Matcher>),
    Insert(Matcher),
    EditPrevious(bool),
    EditNext,
    Focus,
    Cancel,
    Changing,
    SetFunction(Function),
    DeleteFunction,
}

// answers validation on the spot, queues everything else until the session returns
struct Recorder<'a> {
    config: &'a Config,
    matchers: &'a [Matcher],
    active: Option<usize>,
    extra: Option<&'a MatcherValidator>,
    requests: Vec<Request>,
}

impl EditHandler for Recorder<'_> {
    fn matcher_changed(&mut self, matcher: Option<Matcher>) {
        self.requests.push(Request::Changed(matcher));
    }
    fn validate(&mut self, matcher: &Matcher, inserting: bool) -> Option<String> {
        // an insert adds to the sequence, so nothing it holds is being replaced
        let replacing = if inserting { None } else { self.active };
        validate_matcher(
            matcher,
            self.matchers,
            self.config.data_sources(),
            replacing,
            self.config.operators(),
            self.config.limit_policy(),
        )
        .or_else(|| self.extra.and_then(|extra| extra(matcher)))
    }
    fn insert_matcher(&mut self, matcher: Matcher) {
        self.requests.push(Request::Insert(matcher));
    }
    fn edit_previous(&mut self, deleting: bool) {
        self.requests.push(Request::EditPrevious(deleting));
    }
    fn edit_next(&mut self) {
        self.requests.push(Request::EditNext);
    }
    fn focus(&mut self) {
        self.requests.push(Request::Focus);
    }
    fn cancel(&mut self) {
        self.requests.push(Request::Cancel);
    }
    fn changing(&mut self) {
        self.requests.push(Request::Changing);
    }
    fn set_active_function(&mut self, function: &Function) {
        self.requests.push(Request::SetFunction(function.clone()));
    }
    fn delete_active_function(&mut self) {
        self.requests.push(Request::DeleteFunction);
    }
}

pub struct QueryBox {
    config: Arc<Config>,
    keys: KeyGenerator,
    matchers: Vec<Matcher>,
    active: Option<usize>,
    function: Option<Function>,
    unbalanced: Vec<usize>,
    edit: EditSession,
    // shared by every edit session, so a replaced session's lookups stay stale
    generation: Generation,
    has_focus: bool,
    in_edit: bool,
    validator: Option<MatcherValidator>,
    observer: Option<Observer>,
}

impl fmt::Debug for QueryBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueryBox")
            .field("matchers", &self.matchers)
            .field("active", &self.active)
            .field("function", &self.function)
            .field("unbalanced", &self.unbalanced)
            .field("edit", &self.edit)
            .field("has_focus", &self.has_focus)
            .finish_non_exhaustive()
    }
}

impl QueryBox {
    pub fn new(config: Arc<Config>) -> Self {
        let allow_free_text = config.allows_free_text(None);
        let generation = Generation::new();
        Self {
            config,
            keys: KeyGenerator::new(),
            matchers: Vec::new(),
            active: None,
            function: None,
            unbalanced: Vec::new(),
            edit: EditSession::new(true, true, allow_free_text).with_generation(generation.clone()),
            generation,
            has_focus: false,
            in_edit: false,
            validator: None,
            observer: None,
        }
    }
    pub fn with_matchers(mut self, matchers: Vec<Matcher>) -> Self {
        self.matchers = matchers;
        self.rescan();
        self.refresh_edit();
        self
    }
    /// Keys of preloaded matchers must not collide with generated ones.
    pub fn with_keys(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }
    /// Runs after the built-in checks, for rules only the caller knows.
    pub fn with_validator(mut self, validator: impl Fn(&Matcher) -> Option<String> + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
    pub fn on_matchers_changed(mut self, observer: impl Fn(&[Matcher]) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }
    pub fn matcher(&self, key: &str) -> Option<&Matcher> {
        self.matchers.iter().find(|m| m.key() == key)
    }
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }
    pub fn active_function(&self) -> Option<&Function> {
        self.function.as_ref()
    }
    /// Indices of matchers with an unmatched bracket.
    pub fn unbalanced(&self) -> &[usize] {
        &self.unbalanced
    }
    pub fn has_focus(&self) -> bool {
        self.has_focus
    }
    pub fn edit(&self) -> &EditSession {
        &self.edit
    }

    /// The visible items: the active function, then every matcher.
    pub fn items(&self) -> Vec<Item<'_>> {
        self.function
            .iter()
            .map(Item::Function)
            .chain(self.matchers.iter().map(Item::Matcher))
            .collect()
    }

    /// A matcher shows no operator at the start of the sequence or of a bracket group.
    pub fn is_first(&self, index: usize) -> bool {
        index == 0
            || self
                .matchers
                .get(index - 1)
                .is_some_and(|m| m.comparison() == OPEN_BRACKET)
    }

    pub fn display(&self, index: usize) -> Option<String> {
        let hide_operators = self.config.operators() == OperatorMode::Simple;
        self.matchers
            .get(index)
            .map(|m| m.display(self.is_first(index), hide_operators))
    }

    /// The sequence as copied out, prefixed with the active function's name.
    pub fn to_text(&self) -> String {
        let body = self
            .matchers
            .iter()
            .map(Matcher::copy_text)
            .collect::<Vec<_>>()
            .join(" ");
        match &self.function {
            Some(function) => format!("{} {}", function.name(), body),
            None => body,
        }
    }

    // ------------- edit session plumbing -------------
    fn dispatch<R>(&mut self, run: impl FnOnce(&mut EditSession, &EditContext<'_>, &mut Recorder<'_>) -> R) -> R {
        let ctx = EditContext {
            config: &self.config,
            matchers: &self.matchers,
            function: self.function.as_ref(),
            keys: &self.keys,
        };
        let mut recorder = Recorder {
            config: &self.config,
            matchers: &self.matchers,
            active: self.active,
            extra: self.validator.as_ref(),
            requests: Vec::new(),
        };
        let result = run(&mut self.edit, &ctx, &mut recorder);
        let requests = recorder.requests;
        self.apply(requests);
        result
    }

    fn apply(&mut self, requests: Vec<Request>) {
        let edited = self.edit.matcher().map(|m| m.key().to_owned());
        for request in requests {
            match (request, edited.as_deref()) {
                (Request::Changed(Some(matcher)), Some(_)) => {
                    self.update(matcher);
                }
                (Request::Changed(Some(matcher)), None) => self.add(matcher),
                (Request::Changed(None), Some(key)) | (Request::EditPrevious(true), Some(key)) => {
                    self.delete(key);
                }
                (Request::Changed(None), None) => {}
                (Request::Insert(matcher), anchor) => {
                    if let Err(error) = self.insert_before(matcher, anchor) {
                        warn!(%error, "insert dropped");
                    }
                }
                (Request::EditPrevious(_), _) => self.edit_previous(),
                (Request::EditNext, _) => self.edit_next(),
                (Request::Focus, None) => self.gain_focus(),
                (Request::Focus, Some(_)) => {}
                (Request::Cancel, _) => self.clear_active(),
                (Request::Changing, Some(key)) => self.notify_changing(key),
                (Request::Changing, None) => {}
                (Request::SetFunction(function), _) => self.set_function(Some(function)),
                (Request::DeleteFunction, _) => self.set_function(None),
            }
        }
    }

    fn refresh_edit(&mut self) {
        let allow_free_text = self.config.allows_free_text(self.function.as_ref());
        match self.active {
            None => {
                let empty = self.matchers.is_empty();
                self.edit.place(empty, empty && self.function.is_none(), allow_free_text);
            }
            Some(index) => {
                let first = self.is_first(index);
                self.edit.place(first, false, allow_free_text);
            }
        }
    }

    fn set_active(&mut self, index: Option<usize>) {
        let index = index.filter(|&i| i < self.matchers.len());
        let target = index.map(|i| self.matchers[i].key());
        if index == self.active && target == self.edit.matcher().map(Matcher::key) {
            return;
        }
        self.active = index;
        // whatever the outgoing session still has in flight is superseded
        self.generation.advance();
        let allow_free_text = self.config.allows_free_text(self.function.as_ref());
        let session = match index {
            Some(i) => EditSession::editing(
                self.matchers[i].clone(),
                self.is_first(i),
                self.config.operators(),
                allow_free_text,
            ),
            None => {
                let empty = self.matchers.is_empty();
                EditSession::new(empty, empty && self.function.is_none(), allow_free_text)
            }
        };
        self.edit = session.with_generation(self.generation.clone());
        debug!(active = ?self.active, "active matcher changed");
    }

    fn clear_active(&mut self) {
        self.set_active(None);
    }

    fn gain_focus(&mut self) {
        if !self.has_focus {
            self.clear_active();
            self.has_focus = true;
        }
    }

    fn set_function(&mut self, function: Option<Function>) {
        debug!(function = ?function.as_ref().map(Function::name), "active function changed");
        self.function = function;
        self.refresh_edit();
    }

    fn rescan(&mut self) {
        let comparisons: Vec<&str> = self.matchers.iter().map(Matcher::comparison).collect();
        self.unbalanced = find_unbalanced(&comparisons);
    }

    fn updated(&mut self) {
        self.rescan();
        self.refresh_edit();
        debug!(matchers = self.matchers.len(), unbalanced = ?self.unbalanced, "sequence updated");
        if let Some(observer) = &self.observer {
            observer(&self.matchers);
        }
    }

    fn notify_changing(&mut self, key: &str) {
        self.in_edit = true;
        if let Some(observer) = &self.observer {
            let marked: Vec<Matcher> = self
                .matchers
                .iter()
                .map(|m| if m.key() == key { m.with_changing(true) } else { m.clone() })
                .collect();
            observer(&marked);
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.matchers.iter().position(|m| m.key() == key)
    }

    // ------------- input -------------
    /// New text for the open edit box. Returns the async lookups to run.
    pub fn input(&mut self, text: &str) -> Vec<LookupRequest> {
        self.dispatch(|edit, ctx, recorder| edit.set_text(text, ctx, recorder))
    }

    /// Picks an operator and/or comparison for the open box, keeping its search text.
    pub fn compose(&mut self, operator: Option<Operator>, comparison: Option<&str>) -> Vec<LookupRequest> {
        self.dispatch(|edit, ctx, recorder| edit.compose(operator, comparison, ctx, recorder))
    }

    /// Commits the option at a navigation slot, as a click would.
    pub fn choose(&mut self, index: usize, insert: bool) -> KeyResult {
        self.dispatch(|edit, ctx, recorder| edit.select(index, insert, ctx, recorder))
    }

    pub fn highlight(&mut self, index: usize) {
        self.edit.highlight(index);
    }

    /// Applies an async lookup result to the open box; stale ones are dropped.
    pub fn apply_lookup(&mut self, result: &LookupResult) -> bool {
        self.edit.apply_lookup(result, &self.config)
    }

    pub fn focus(&mut self) {
        self.dispatch(|edit, _, recorder| edit.focus(recorder));
    }

    /// Focus left the widget: collapse any open edit and clear the selection.
    pub fn blur(&mut self) {
        self.has_focus = false;
        self.clear_active();
        self.edit.reset();
    }

    pub fn key(&mut self, event: KeyEvent) -> Response {
        let result = self.dispatch(|edit, ctx, recorder| edit.key(event, ctx, recorder));
        if result.is_handled() {
            return Response::Edit(result);
        }
        let handled = match event.key {
            Key::ArrowLeft if event.shift => {
                self.select_previous();
                true
            }
            Key::ArrowRight if event.shift => {
                self.select_next();
                true
            }
            Key::ArrowLeft if event.ctrl => self.move_active(false),
            Key::ArrowRight if event.ctrl => self.move_active(true),
            Key::Backspace if event.shift => {
                self.delete_last();
                true
            }
            Key::Backspace if event.ctrl => {
                self.delete_all();
                true
            }
            Key::Enter => {
                return match self.complete() {
                    Ok(completion) => Response::Completed(completion),
                    Err(error) => Response::Incomplete(error),
                };
            }
            Key::Home => self.first(),
            Key::End => self.end(),
            _ => false,
        };
        if handled { Response::Handled } else { Response::Ignored }
    }

    // ------------- structural edits -------------
    pub fn add(&mut self, matcher: Matcher) {
        debug!(key = matcher.key(), "adding matcher");
        self.matchers.push(matcher);
        self.updated();
    }

    /// Substitutes the matcher with the same key and closes the edit.
    pub fn update(&mut self, matcher: Matcher) -> bool {
        let Some(index) = self.position(matcher.key()) else {
            return false;
        };
        self.matchers[index] = matcher;
        self.clear_active();
        self.updated();
        true
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.remove(key, true)
    }

    fn remove(&mut self, key: &str, clear_active: bool) -> bool {
        let before = self.matchers.len();
        self.matchers.retain(|m| m.key() != key);
        if self.matchers.len() == before {
            return false;
        }
        if self.active.is_some_and(|a| clear_active || a >= self.matchers.len()) {
            self.clear_active();
        }
        self.updated();
        true
    }

    /// Removes the last matcher, or the active function once there are none.
    pub fn delete_last(&mut self) {
        match self.matchers.last().map(|m| m.key().to_owned()) {
            Some(key) => {
                self.remove(&key, false);
            }
            None if self.function.is_some() => self.set_function(None),
            None => {}
        }
    }

    pub fn delete_all(&mut self) {
        self.matchers.clear();
        self.function = None;
        self.clear_active();
        self.updated();
    }

    /// Inserts before the matcher keyed `anchor`, or appends when there is none.
    pub fn insert_before(&mut self, matcher: Matcher, anchor: Option<&str>) -> Result<()> {
        match anchor {
            None => self.matchers.push(matcher),
            Some(key) => {
                let index = self
                    .position(key)
                    .ok_or_else(|| QueryboxError::Invariant(format!("no matcher '{}' to insert before", key)))?;
                self.matchers.insert(index, matcher);
                if let Some(active) = self.active.filter(|&active| index <= active) {
                    self.active = Some(active + 1);
                }
            }
        }
        self.updated();
        Ok(())
    }

    /// Exchanges two matchers by key. The active selection follows its matcher.
    pub fn swap(&mut self, a: &str, b: &str) -> bool {
        let (Some(i), Some(j)) = (self.position(a), self.position(b)) else {
            return false;
        };
        self.matchers.swap(i, j);
        self.active = self.active.map(|active| match active {
            x if x == i => j,
            x if x == j => i,
            x => x,
        });
        self.updated();
        true
    }

    /// Swaps the active matcher with its neighbour, wrapping at the ends.
    pub fn move_active(&mut self, forward: bool) -> bool {
        let len = self.matchers.len();
        let Some(active) = self.active.filter(|_| len > 1) else {
            return false;
        };
        let target = match forward {
            true if active + 1 < len => active + 1,
            true => 0,
            false if active > 0 => active - 1,
            false => len - 1,
        };
        let a = self.matchers[active].key().to_owned();
        let b = self.matchers[target].key().to_owned();
        self.swap(&a, &b)
    }

    // ------------- selection -------------
    pub fn select(&mut self, index: usize) {
        self.has_focus = true;
        self.set_active(Some(index));
    }

    pub fn select_previous(&mut self) {
        let len = self.matchers.len();
        let target = match self.active {
            None if len > 0 => Some(len - 1),
            Some(active) if active > 0 => Some(active - 1),
            _ => None,
        };
        self.set_active(target);
    }

    pub fn select_next(&mut self) {
        let len = self.matchers.len();
        let target = match self.active {
            None if len > 0 => Some(0),
            Some(active) if active + 1 < len => Some(active + 1),
            _ => None,
        };
        self.set_active(target);
    }

    /// Opens the previous matcher for edit; from the trailing box, the last one.
    pub fn edit_previous(&mut self) {
        let len = self.matchers.len();
        match self.active {
            None if len > 0 => self.set_active(Some(len - 1)),
            Some(active) if active > 0 => self.set_active(Some(active - 1)),
            _ => {}
        }
    }

    pub fn edit_next(&mut self) {
        if let Some(active) = self.active.filter(|&a| a + 1 < self.matchers.len()) {
            self.set_active(Some(active + 1));
        }
    }

    /// Jumps to the first matcher.
    pub fn first(&mut self) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        self.set_active(Some(0));
        true
    }

    /// Jumps back to the trailing box.
    pub fn end(&mut self) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        self.clear_active();
        true
    }

    /// Replaces the sequence from outside, unless the change is the echo of an edit in progress.
    pub fn sync(&mut self, matchers: Vec<Matcher>) {
        if self.in_edit {
            self.in_edit = false;
            return;
        }
        self.matchers = matchers;
        if self.active.is_some_and(|a| a >= self.matchers.len()) {
            self.clear_active();
        }
        self.rescan();
        self.refresh_edit();
    }

    // ------------- completion -------------
    /// Checks the active function's requirements and hands the sequence out.
    pub fn complete(&mut self) -> std::result::Result<Completion, CompleteError> {
        if let Some(function) = &self.function {
            if let Err(error) = validate_function(function, &self.matchers) {
                debug!(%error, missing = ?error.missing, "completion refused");
                return Err(error);
            }
        }
        let completion = Completion {
            matchers: std::mem::take(&mut self.matchers),
            function: self.function.take().map(|f| f.name().to_owned()),
        };
        self.has_focus = false;
        self.clear_active();
        self.edit.reset();
        self.updated();
        debug!(matchers = completion.matchers.len(), "sequence completed");
        Ok(completion)
    }

    // ------------- drag and drop -------------
    pub fn drag_payload(&self, key: &str) -> Result<DragPayload> {
        let matcher = self
            .matcher(key)
            .ok_or_else(|| QueryboxError::Invariant(format!("no matcher '{}' to drag", key)))?;
        Ok(DragPayload {
            type_tag: format!("{}{}", DRAG_PREFIX, key),
            data: serde_json::to_string(matcher)?,
        })
    }

    /// A matcher accepts a drag of any other matcher, never of itself.
    pub fn accepts_drop<S: AsRef<str>>(&self, target: &str, offered: &[S]) -> bool {
        let own = format!("{}{}", DRAG_PREFIX, target);
        self.position(target).is_some()
            && offered.iter().any(|t| t.as_ref().starts_with(DRAG_PREFIX))
            && !offered.iter().any(|t| t.as_ref() == own)
    }

    /// Drops a dragged matcher onto `target`, swapping the two. Malformed payloads are ignored.
    pub fn drop_payload(&mut self, target: &str, type_tag: &str, data: &str) -> bool {
        if !type_tag.starts_with(DRAG_PREFIX) {
            return false;
        }
        match parse_payload(data) {
            Ok(dragged) => self.swap(target, dragged.key()),
            Err(error) => {
                debug!(%error, "ignoring malformed drop");
                false
            }
        }
    }
}
