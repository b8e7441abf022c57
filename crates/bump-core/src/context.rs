use std::sync::Arc;

use document_store::WriterRegistry;

/// Run-wide settings handed to every stage through `RecordSource::set_context`.
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    worker_id: Option<String>,
    registry: Option<Arc<WriterRegistry>>,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify the worker running this pipeline in summary records.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Share store connections through `registry` instead of letting every
    /// operator open its own.
    pub fn with_registry(mut self, registry: Arc<WriterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }

    pub fn registry(&self) -> Option<&Arc<WriterRegistry>> {
        self.registry.as_ref()
    }
}
