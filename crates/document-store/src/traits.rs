//! DocumentWriter and WriterConnector trait definitions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Result, WriteRequest};

/// Trait for writing increment batches to a document store.
///
/// A batch is sent as a single call so the store can apply it as one
/// multi-document operation. Implementations must not retry internally:
/// a failure is reported to the caller, which decides what to do with the
/// batch.
///
/// # Usage Pattern
///
/// ```ignore
/// let writer: Arc<dyn DocumentWriter> = connector.connect("mongodb://localhost/shop").await?;
/// writer.write_batch("products", &batch).await?;
/// writer.shutdown().await?;
/// ```
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Apply every request of `batch` to documents of `collection`.
    async fn write_batch(&self, collection: &str, batch: &[WriteRequest]) -> Result<()>;

    /// Release resources held by this writer.
    ///
    /// Only called by the party that owns the writer.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens writers for a cluster locator (a connection string or address of
/// the store cluster).
#[async_trait]
pub trait WriterConnector: Send + Sync {
    /// Connect to the cluster at `cluster_locator` and validate the connection.
    async fn connect(&self, cluster_locator: &str) -> Result<Arc<dyn DocumentWriter>>;
}
