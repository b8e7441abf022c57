//! JSON Lines record source.
//!
//! Reads one JSON object per line from a local file. Blank lines are
//! skipped; any other line that is not a JSON object fails the read with the
//! offending line number.

mod source;

pub use source::JsonlSource;
