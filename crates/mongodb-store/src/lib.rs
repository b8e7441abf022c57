//! MongoDB writer for bump-stream.
//!
//! Applies a batch of increments as a single `update` command holding one
//! upserting `$inc` statement per request, so the whole batch costs one
//! round trip.

mod writer;

pub use writer::{build_update_command, check_update_reply, MongoConnector, MongoWriter};
