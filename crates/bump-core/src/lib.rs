//! Core types for the bump-stream pipeline.
//!
//! This crate provides the foundational types shared by every pipeline stage:
//!
//! - [`Record`] - one unit flowing through the pipeline, or the end-of-stream sentinel
//! - [`RecordSource`] - the pull protocol every stage implements
//! - [`PushBackSource`] - source adapter that can hand one record back
//! - [`MemorySource`] - source over an in-memory list of records
//! - [`StreamExpression`] - textual construction form of a pipeline
//! - [`Explanation`] - explain-plan tree of a pipeline
//! - [`StreamContext`] - per-run settings handed to every stage
//! - [`Error`] - the error kinds a pipeline can raise
//!
//! # Architecture
//!
//! ```text
//! document-store   (writer trait, registry)
//!    │
//! bump-core (this crate)
//!    │
//!    ├─── jsonl-source   (RecordSource over JSON Lines files)
//!    └─── bump-stream    (the bump operator, factory and CLI)
//! ```

mod context;
mod error;
pub mod explain;
pub mod expr;
mod memory;
mod pushback;
mod record;
mod source;

pub use context::StreamContext;
pub use error::{Error, Result};
pub use explain::{Explanation, ExpressionType};
pub use expr::{ExpressionParam, StreamExpression};
pub use memory::{MemorySource, SourceProbe};
pub use pushback::PushBackSource;
pub use record::{Record, EOF_FIELD};
pub use source::{RecordSource, SortDirection, SortKey, SortOrder};
