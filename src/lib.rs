//! Querybox – the engine behind an interactive query-builder input.
//!
//! A user builds a query as a sequence of *matchers* by typing into an edit
//! box, picking from live suggestions, or reordering what is already there.
//! A [`construct::Matcher`] couples:
//! * an [`construct::Operator`] (`and` / `or`) relative to the previous matcher,
//! * a comparison symbol legal for its source (`=`, `!`, `>=`, `*`, ...),
//! * the name of the [`source::DataSource`] it came from,
//! * a typed [`datatype::Value`] and its display text.
//!
//! Brackets are matchers too, with the comparison `(` or `)`, and free text is
//! a matcher with the comparison `"`.
//!
//! ## Modules
//! * [`tokenizer`] – Splits edit text into operator, comparison and search text.
//! * [`resolver`] – Runs search text against every eligible source; async lookups
//!   are handed out as requests tied to a generation token.
//! * [`aggregate`] – Merges suggestions into ranked, capped category buckets.
//! * [`validate`] – Comparison legality, selection limits and function completion.
//! * [`brackets`] – Flags unmatched brackets in a sequence.
//! * [`interface`] – Generation tokens and the tokio side of async lookups.
//! * [`edit`] – The edit-state controller behind one edit box.
//! * [`sequence`] – [`sequence::QueryBox`], the controller owning the whole sequence.
//! * [`settings`] – Session configuration, loadable through the `config` crate.
//! * [`server`] – An axum JSON surface over the pure entry points.
//!
//! ## Staleness
//! Every keystroke advances the edit session's generation. An async lookup
//! captures the token current when it was issued and its result is applied only
//! while that token is still current, so answers for old text are dropped
//! silently whatever order they arrive in.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use querybox::edit::{Key, KeyEvent};
//! use querybox::sequence::QueryBox;
//! use querybox::settings::{Config, STRING_COMPARISONS};
//! use querybox::source::{DataSource, ListLookup};
//!
//! let colours = DataSource::new("colour", "Colours", STRING_COMPARISONS.iter().copied())
//!     .definition(ListLookup::items(["red", "green", "blue"]));
//! let mut query = QueryBox::new(Arc::new(Config::new(vec![colours])));
//! query.input("gre");
//! query.key(KeyEvent::new(Key::Enter));
//! assert_eq!(query.matchers()[0].text(), "green");
//! assert_eq!(query.to_text(), "green");
//! ```

pub mod aggregate;
pub mod brackets;
pub mod construct;
pub mod datatype;
pub mod edit;
pub mod error;
pub mod interface;
pub mod resolver;
pub mod sequence;
pub mod server;
pub mod settings;
pub mod source;
pub mod tokenizer;
pub mod validate;

pub use construct::{Matcher, Operator};
pub use error::{CompleteError, QueryboxError, Result};
pub use sequence::QueryBox;
pub use settings::Config;
