//! bump-stream
//!
//! A pull-based pipeline stage that counts records into a document store.
//! For every record read from its upstream the `bump` operator increments a
//! numeric field (default `bump`) by one on the document whose identifier
//! (default field `id`) matches the record. Increments are written in
//! batches; each batch yields one summary record downstream.
//!
//! # Crates
//!
//! - `bump_core` - records, the `RecordSource` pull protocol, expressions
//! - `document_store` - writer trait, shared writer registry, in-memory store
//! - `mongodb_store` - MongoDB writer (`$inc` with upsert)
//! - `jsonl_source` - JSON Lines upstream
//!
//! # CLI Usage
//!
//! ```bash
//! # Count clicks per product
//! bump-stream run \
//!   'bump(products, batchSize=500, cluster="mongodb://localhost:27017/shop", field=clicks, jsonl(file="clicks.jsonl"))'
//!
//! # Show the explain tree without touching the store
//! bump-stream explain 'bump(products, batchSize=500, jsonl(file="clicks.jsonl"))' \
//!   --default-cluster mongodb://localhost:27017/shop
//! ```

pub mod accounting;
pub mod accumulator;
pub mod config;
pub mod factory;
pub mod gateway;
pub mod operator;

pub use accounting::{Accounting, SummaryRecord};
pub use accumulator::{to_write_request, BatchAccumulator};
pub use config::{BumpConfig, Settings};
pub use factory::{StreamConstructor, StreamFactory};
pub use gateway::WriterGateway;
pub use operator::{BumpStream, Phase};

use bump_core::{Record, RecordSource, Result};

/// Open `source`, hand every record to `on_record` until end-of-stream, then
/// close it. The source is closed on failure too; the first error wins.
///
/// Returns the number of records handed out.
pub async fn drain<F>(source: &mut dyn RecordSource, mut on_record: F) -> Result<u64>
where
    F: FnMut(Record) + Send,
{
    source.open().await?;

    let mut count = 0;
    let result = loop {
        match source.read().await {
            Ok(record) if record.is_eof() => break Ok(count),
            Ok(record) => {
                count += 1;
                on_record(record);
            }
            Err(e) => break Err(e),
        }
    };

    let closed = source.close().await;
    let count = result?;
    closed?;
    Ok(count)
}
