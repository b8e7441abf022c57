//! Batched writes of one operator through its store connection.

use std::sync::Arc;

use bump_core::{Error, Result, StreamContext};
use document_store::{StoreConnection, StoreError, WriteRequest, WriterConnector};

/// Sends batches of one collection to the store and owns the connection
/// they go through.
#[derive(Debug)]
pub struct WriterGateway {
    collection: String,
    cluster_locator: String,
    connection: StoreConnection,
}

impl WriterGateway {
    pub fn new(
        collection: impl Into<String>,
        cluster_locator: impl Into<String>,
        connection: StoreConnection,
    ) -> Self {
        Self {
            collection: collection.into(),
            cluster_locator: cluster_locator.into(),
            connection,
        }
    }

    /// Borrow a writer from the context's registry when there is one,
    /// otherwise open a connection owned by this gateway.
    pub async fn connect(
        collection: &str,
        cluster_locator: &str,
        context: &StreamContext,
        connector: &Arc<dyn WriterConnector>,
    ) -> Result<Self> {
        let connection = match context.registry() {
            Some(registry) => StoreConnection::Borrowed(
                registry
                    .get_or_connect(cluster_locator)
                    .await
                    .map_err(|e| connection_error(cluster_locator, &e))?,
            ),
            None => {
                tracing::info!("Opening store connection for collection '{collection}'");
                StoreConnection::Owned(
                    connector
                        .connect(cluster_locator)
                        .await
                        .map_err(|e| connection_error(cluster_locator, &e))?,
                )
            }
        };
        Ok(Self::new(collection, cluster_locator, connection))
    }

    /// Apply `batch` with a single store call. An empty batch is not sent.
    pub async fn write_batch(&self, batch: &[WriteRequest]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.connection
            .writer()
            .write_batch(&self.collection, batch)
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Unable to bump {} documents in collection '{}': {e}",
                    batch.len(),
                    self.collection
                );
                Error::WriteFailure {
                    collection: self.collection.clone(),
                    category: e.category().to_string(),
                    message: e.message(),
                }
            })
    }

    pub fn is_owned(&self) -> bool {
        self.connection.is_owned()
    }

    /// Give the connection back. Only an owned connection is shut down.
    pub async fn release(self) -> Result<()> {
        let cluster_locator = self.cluster_locator;
        self.connection
            .release()
            .await
            .map_err(|e| connection_error(&cluster_locator, &e))
    }
}

fn connection_error(cluster_locator: &str, error: &StoreError) -> Error {
    Error::Connection {
        cluster: cluster_locator.to_string(),
        category: error.category().to_string(),
        message: error.message(),
    }
}
