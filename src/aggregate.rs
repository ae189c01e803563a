//! Merges per-source suggestions into ordered, capped category buckets.
//!
//! Buckets are ordered by rank: higher precedence first, and among equal
//! precedence the source configured first. A new category is inserted before
//! the first bucket it outranks, so the final order never depends on the order
//! in which sources answered. The synthetic `Functions` category outranks
//! every source and is never capped.
//!
//! An empty bucket is a placeholder for a lookup still in flight; it occupies
//! one navigation slot so the keyboard can stop on its "Loading" row.

use crate::datatype::Value;
use crate::source::DataSource;

pub const FUNCTIONS_TEXT: &str = "Functions";
pub const FUNCTION_SOURCE: &str = "__function__";

/// An unconfirmed suggestion scoped to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub source: String,
    pub value: Value,
    pub text: String,
}

impl Suggestion {
    pub fn new(source: impl Into<String>, value: impl Into<Value>, text: impl Into<String>) -> Self {
        Self { source: source.into(), value: value.into(), text: text.into() }
    }
    pub fn function(name: &str) -> Self {
        Self::new(FUNCTION_SOURCE, name, name)
    }
    pub fn is_function(&self) -> bool {
        self.source == FUNCTION_SOURCE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    precedence: i64,
    position: usize,
}

impl Rank {
    pub fn new(precedence: i64, position: usize) -> Self {
        Self { precedence, position }
    }
    pub fn functions() -> Self {
        Self { precedence: i64::MAX, position: 0 }
    }
    pub fn outranks(&self, other: &Rank) -> bool {
        self.precedence > other.precedence || (self.precedence == other.precedence && self.position < other.position)
    }
}

/// Identifies the bucket a batch of suggestions belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub title: String,
    pub rank: Rank,
}

impl Category {
    /// `position` is the source's index in the configuration.
    pub fn of(ds: &DataSource, position: usize) -> Self {
        Self { title: ds.title().to_owned(), rank: Rank::new(ds.rank(), position) }
    }
    pub fn functions() -> Self {
        Self { title: FUNCTIONS_TEXT.to_owned(), rank: Rank::functions() }
    }
}

// what one definition contributed to a bucket
#[derive(Debug, Clone, PartialEq)]
struct Batch {
    origin: usize,
    options: Vec<Suggestion>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    title: String,
    rank: Rank,
    batches: Vec<Batch>,
    options: Vec<Suggestion>,
}

impl Bucket {
    fn empty(category: &Category) -> Self {
        Self { title: category.title.clone(), rank: category.rank, batches: Vec::new(), options: Vec::new() }
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn options(&self) -> &[Suggestion] {
        &self.options
    }
    pub fn is_placeholder(&self) -> bool {
        self.options.is_empty()
    }
    // navigation slots taken by this bucket
    fn slots(&self) -> usize {
        self.options.len().max(1)
    }

    fn absorb(&mut self, origin: usize, options: Vec<Suggestion>, limit: Option<usize>) {
        match self.batches.binary_search_by_key(&origin, |b| b.origin) {
            Ok(index) => {
                let batch = &mut self.batches[index];
                let existing = std::mem::take(&mut batch.options);
                batch.options = union(existing, options, limit);
                batch.limit = limit;
            }
            Err(index) => {
                let options = union(Vec::new(), options, limit);
                self.batches.insert(index, Batch { origin, options, limit });
            }
        }
        self.rebuild();
    }

    // batches in origin order, so the visible options never depend on arrival order
    fn rebuild(&mut self) {
        let cap = if self.batches.iter().any(|b| b.limit.is_none()) {
            None
        } else {
            self.batches.iter().filter_map(|b| b.limit).max()
        };
        let merged = self.batches.iter().fold(Vec::new(), |merged, batch| union(merged, batch.options.clone(), None));
        self.options = union(merged, Vec::new(), cap);
    }
}

fn union(mut existing: Vec<Suggestion>, incoming: Vec<Suggestion>, limit: Option<usize>) -> Vec<Suggestion> {
    for option in incoming {
        if !existing.iter().any(|o| o.value == option.value) {
            existing.push(option);
        }
    }
    if let Some(limit) = limit {
        existing.truncate(limit);
    }
    existing
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets(Vec<Bucket>);

impl Buckets {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, bucket: Bucket) {
        match self.0.iter().position(|b| bucket.rank.outranks(&b.rank)) {
            Some(index) => self.0.insert(index, bucket),
            None => self.0.push(bucket),
        }
    }

    /// Adds the suggestions one definition (`origin`) produced for a category,
    /// creating the category at its ranked position when it is new.
    ///
    /// Each definition's batch is de-duplicated by value and capped at `limit`
    /// (`None` leaves it uncapped). The category shows its batches in origin
    /// order, capped at the largest batch limit, so merging is commutative.
    pub fn merge_into(mut self, category: &Category, origin: usize, options: Vec<Suggestion>, limit: Option<usize>) -> Self {
        match self.0.iter_mut().find(|b| b.title == category.title) {
            Some(bucket) => bucket.absorb(origin, options, limit),
            None => {
                let mut bucket = Bucket::empty(category);
                bucket.absorb(origin, options, limit);
                self.insert(bucket);
            }
        }
        self
    }

    /// Reserves the category's position while its lookup is in flight.
    pub fn with_placeholder(mut self, category: &Category) -> Self {
        if !self.0.iter().any(|b| b.title == category.title) {
            self.insert(Bucket::empty(category));
        }
        self
    }

    /// Drops the category if it is still only a placeholder. Reports whether anything changed.
    pub fn without_placeholder(mut self, title: &str) -> (Self, bool) {
        let before = self.0.len();
        self.0.retain(|b| !(b.title == title && b.is_placeholder()));
        let changed = self.0.len() != before;
        (self, changed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn titles(&self) -> Vec<&str> {
        self.0.iter().map(|b| b.title()).collect()
    }
    pub fn bucket(&self, title: &str) -> Option<&Bucket> {
        self.0.iter().find(|b| b.title == title)
    }

    /// Total navigation slots, counting a placeholder as one.
    pub fn total(&self) -> usize {
        self.0.iter().map(Bucket::slots).sum()
    }

    /// The suggestion at a navigation slot; `None` for a placeholder slot or out of range.
    pub fn get(&self, index: usize) -> Option<&Suggestion> {
        let mut start = 0;
        for bucket in &self.0 {
            if index < start + bucket.slots() {
                return bucket.options.get(index - start);
            }
            start += bucket.slots();
        }
        None
    }

    // position of the bucket holding a slot
    fn locate(&self, index: usize) -> Option<usize> {
        let mut start = 0;
        for (position, bucket) in self.0.iter().enumerate() {
            if index < start + bucket.slots() {
                return Some(position);
            }
            start += bucket.slots();
        }
        None
    }

    fn start_of(&self, position: usize) -> usize {
        self.0.iter().take(position).map(Bucket::slots).sum()
    }

    /// First slot of the next (or previous) category, wrapping around the list.
    pub fn category_start(&self, index: usize, forward: bool) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        let last = self.0.len() - 1;
        let position = self.locate(index).unwrap_or(last);
        let target = if forward {
            if position < last { position + 1 } else { 0 }
        } else if position > 0 {
            position - 1
        } else {
            last
        };
        self.start_of(target)
    }
}
