//! In-memory document store.
//!
//! Keeps increment counters per collection, document identifier and field.
//! Used for dry runs and as the store in operator tests. Individual calls
//! can be made to fail to exercise write-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{DocumentWriter, Result, StoreError, WriteRequest, WriterConnector};

#[derive(Default)]
struct Inner {
    // collection -> identifier (JSON text) -> field -> value
    counters: HashMap<String, HashMap<String, HashMap<String, i64>>>,
    // (collection, batch size) of every successful write
    batches: Vec<(String, usize)>,
    write_calls: usize,
    // 1-based write call number -> error to report instead of writing
    failures: HashMap<usize, StoreError>,
    shutdowns: usize,
}

/// Cloneable handle to an in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the `call`-th `write_batch` call (1-based) fail with `error`.
    ///
    /// A failing call applies none of its increments.
    pub fn fail_call(&self, call: usize, error: StoreError) {
        self.lock().failures.insert(call, error);
    }

    /// Current value of `field` on the document identified by `id`.
    pub fn counter(&self, collection: &str, id: &Value, field: &str) -> Option<i64> {
        self.lock()
            .counters
            .get(collection)
            .and_then(|docs| docs.get(&id_key(id)))
            .and_then(|fields| fields.get(field))
            .copied()
    }

    /// Number of distinct documents touched in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .counters
            .get(collection)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Sizes of all successfully applied batches, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batches.iter().map(|(_, size)| *size).collect()
    }

    /// Collections written by successfully applied batches, in order.
    pub fn batch_collections(&self) -> Vec<String> {
        self.lock()
            .batches
            .iter()
            .map(|(collection, _)| collection.clone())
            .collect()
    }

    /// Number of `write_batch` calls, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    pub fn shutdown_count(&self) -> usize {
        self.lock().shutdowns
    }
}

fn id_key(id: &Value) -> String {
    id.to_string()
}

#[async_trait]
impl DocumentWriter for MemoryStore {
    async fn write_batch(&self, collection: &str, batch: &[WriteRequest]) -> Result<()> {
        let mut inner = self.lock();
        inner.write_calls += 1;
        let call = inner.write_calls;
        if let Some(error) = inner.failures.remove(&call) {
            tracing::debug!("Memory store failing write call {call} on purpose: {error}");
            return Err(error);
        }

        let documents = inner.counters.entry(collection.to_string()).or_default();
        for request in batch {
            *documents
                .entry(id_key(&request.id))
                .or_default()
                .entry(request.increment.field.clone())
                .or_insert(0) += request.increment.delta;
        }
        inner.batches.push((collection.to_string(), batch.len()));
        tracing::trace!(
            "Memory store applied {} increments to '{}'",
            batch.len(),
            collection
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.lock().shutdowns += 1;
        Ok(())
    }
}

/// Connector that hands out the same [`MemoryStore`] for every cluster locator.
#[derive(Clone)]
pub struct MemoryConnector {
    store: MemoryStore,
    connects: Arc<AtomicUsize>,
    connect_failure: Arc<Mutex<Option<StoreError>>>,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            connects: Arc::new(AtomicUsize::new(0)),
            connect_failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Make the next `connect` call fail with `error`.
    pub fn fail_connect(&self, error: StoreError) {
        *self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Number of `connect` calls served so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WriterConnector for MemoryConnector {
    async fn connect(&self, cluster_locator: &str) -> Result<Arc<dyn DocumentWriter>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(error) = failure {
            tracing::debug!("Memory connector refusing cluster {cluster_locator}: {error}");
            return Err(error);
        }
        tracing::debug!("Connected in-memory store for cluster {cluster_locator}");
        Ok(Arc::new(self.store.clone()))
    }
}
