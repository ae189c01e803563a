//! Asynchronous interface for issuing source lookups and discarding stale results.
//!
//! An edit session owns a [`Generation`]; every text change advances it.
//! Async list lookups are not run by the session itself. Instead it hands out
//! [`LookupRequest`]s that captured the token current at issue time. Whoever
//! drives the session runs them, either through a [`LookupRunner`] that spawns
//! them on tokio and streams [`LookupResult`]s back over a channel, or through
//! [`resolve_all`] which awaits a whole batch.
//!
//! A request waits out its debounce delay first and is dropped without calling
//! the lookup if a newer keystroke superseded it in the meantime. Results are
//! tagged with their token and checked again when the session applies them,
//! so a slow answer for old text can never land on fresh state. There is no
//! cancellation of a call already in flight; staleness is detected at the
//! result boundary.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::datatype::SourceItem;
use crate::error::{QueryboxError, Result};
use crate::resolver::{self, ResolveContext, Suggestions};
use crate::source::{AsyncLookup, LookupQuery};

/// Monotonic staleness marker shared between a session and its lookups.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }
    /// Invalidates every token handed out so far and returns the new one.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}

// two handles are equal when they share one counter
impl PartialEq for Generation {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Generation {}

/// An async lookup waiting to be issued.
#[derive(Clone)]
pub struct LookupRequest {
    pub token: u64,
    pub source: String,
    pub definition: usize,
    pub query: LookupQuery,
    pub delay: Duration,
    lookup: AsyncLookup,
    generation: Generation,
}

impl LookupRequest {
    pub(crate) fn new(
        generation: &Generation,
        token: u64,
        source: &str,
        definition: usize,
        query: LookupQuery,
        delay: Duration,
        lookup: AsyncLookup,
    ) -> Self {
        Self {
            token,
            source: source.to_owned(),
            definition,
            query,
            delay,
            lookup,
            generation: generation.clone(),
        }
    }
    pub fn is_stale(&self) -> bool {
        !self.generation.is_current(self.token)
    }
}

impl fmt::Debug for LookupRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LookupRequest")
            .field("token", &self.token)
            .field("source", &self.source)
            .field("definition", &self.definition)
            .field("text", &self.query.text)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Items returned by an async lookup, tagged with the generation and token
/// it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub origin: Generation,
    pub token: u64,
    pub source: String,
    pub definition: usize,
    pub items: Vec<SourceItem>,
}

/// Waits out the debounce delay, then calls the lookup unless superseded.
pub async fn run_lookup(request: LookupRequest) -> Option<LookupResult> {
    if !request.delay.is_zero() {
        tokio::time::sleep(request.delay).await;
    }
    if request.is_stale() {
        debug!(source = %request.source, token = request.token, "lookup superseded before issue");
        return None;
    }
    debug!(source = %request.source, token = request.token, text = %request.query.text, "issuing lookup");
    let items = (request.lookup)(request.query.clone()).await;
    if request.is_stale() {
        debug!(source = %request.source, token = request.token, "discarding stale lookup result");
        return None;
    }
    Some(LookupResult {
        origin: request.generation,
        token: request.token,
        source: request.source,
        definition: request.definition,
        items,
    })
}

/// Awaits a batch of lookups concurrently and keeps the fresh results.
pub async fn resolve_all(requests: Vec<LookupRequest>) -> Vec<LookupResult> {
    join_all(requests.into_iter().map(run_lookup))
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Tokenizes, resolves and aggregates, then awaits the async sources as well.
pub async fn suggest_settled(text: &str, ctx: &ResolveContext<'_>) -> Suggestions {
    let mut suggestions = resolver::suggest(text, ctx);
    let pending = std::mem::take(&mut suggestions.pending);
    for result in resolve_all(pending).await {
        if let Some(buckets) = resolver::merge_lookup(suggestions.buckets.clone(), &result, ctx.config) {
            suggestions.buckets = buckets;
        }
    }
    suggestions.total = suggestions.buckets.total();
    suggestions
}

/// Spawns lookups on the tokio runtime and streams their results back.
#[derive(Debug, Clone)]
pub struct LookupRunner {
    tx: UnboundedSender<LookupResult>,
}

impl LookupRunner {
    pub fn new() -> (Self, UnboundedReceiver<LookupResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn submit(&self, request: LookupRequest) -> Result<JoinHandle<()>> {
        if self.tx.is_closed() {
            return Err(QueryboxError::Lookup {
                source_name: request.source,
                message: "result receiver has been dropped".to_owned(),
            });
        }
        let tx = self.tx.clone();
        Ok(tokio::spawn(async move {
            if let Some(result) = run_lookup(request).await {
                let source = result.source.clone();
                if tx.send(result).is_err() {
                    warn!(%source, "lookup result dropped, receiver gone");
                }
            }
        }))
    }

    pub fn submit_all(&self, requests: Vec<LookupRequest>) -> Result<Vec<JoinHandle<()>>> {
        requests.into_iter().map(|r| self.submit(r)).collect()
    }
}
