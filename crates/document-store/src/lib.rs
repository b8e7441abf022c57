//! Document store write abstraction.
//!
//! This crate defines the `DocumentWriter` trait that abstracts over the
//! remote document store a bump pipeline writes to. Store-specific crates
//! (e.g. `mongodb-store`) implement it, and the in-memory `MemoryStore`
//! implements it for dry runs and tests.
//!
//! Connections are handed to operators as a [`StoreConnection`], which
//! records at the type level whether the operator owns the writer (and must
//! shut it down) or borrowed it from a shared [`WriterRegistry`].

mod connection;
mod error;
mod memory;
mod registry;
mod request;
mod traits;

pub use connection::StoreConnection;
pub use error::{Result, StoreError};
pub use memory::{MemoryConnector, MemoryStore};
pub use registry::WriterRegistry;
pub use request::{Increment, WriteRequest};
pub use traits::{DocumentWriter, WriterConnector};
