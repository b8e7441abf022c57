//! Shared writer registry keyed by cluster locator.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{DocumentWriter, Result, WriterConnector};

/// Registry of writers shared between operators, one per cluster locator.
///
/// Writers handed out by the registry stay owned by it: operators borrow
/// them and never shut them down. The registry's owner calls
/// [`WriterRegistry::shutdown_all`] when the pipeline is torn down.
pub struct WriterRegistry {
    connector: Arc<dyn WriterConnector>,
    writers: Mutex<HashMap<String, Arc<dyn DocumentWriter>>>,
}

impl WriterRegistry {
    pub fn new(connector: Arc<dyn WriterConnector>) -> Self {
        Self {
            connector,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the writer for `cluster_locator`, connecting on first use.
    pub async fn get_or_connect(&self, cluster_locator: &str) -> Result<Arc<dyn DocumentWriter>> {
        let mut writers = self.writers.lock().await;
        if let Some(writer) = writers.get(cluster_locator) {
            return Ok(Arc::clone(writer));
        }

        tracing::info!("Opening shared store connection for cluster {cluster_locator}");
        let writer = self.connector.connect(cluster_locator).await?;
        writers.insert(cluster_locator.to_string(), Arc::clone(&writer));
        Ok(writer)
    }

    /// Number of distinct clusters currently connected.
    pub async fn len(&self) -> usize {
        self.writers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.writers.lock().await.is_empty()
    }

    /// Shut down every registered writer and empty the registry.
    ///
    /// All writers are shut down even if some fail; the first error is returned.
    pub async fn shutdown_all(&self) -> Result<()> {
        let writers: Vec<_> = self.writers.lock().await.drain().collect();
        let mut first_error = None;
        for (cluster_locator, writer) in writers {
            tracing::debug!("Shutting down shared store connection for cluster {cluster_locator}");
            if let Err(e) = writer.shutdown().await {
                tracing::warn!("Failed to shut down connection for cluster {cluster_locator}: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterRegistry").finish_non_exhaustive()
    }
}
