//! Single-record pushback adapter.

use async_trait::async_trait;

use crate::{
    Error, Explanation, Record, RecordSource, Result, SortOrder, StreamContext, StreamExpression,
};

/// Wraps a source and lets the caller return the last record it read.
///
/// The retained record is handed out again by the next `read`. Only one
/// record can be retained: pushing back twice without a `read` in between,
/// or before anything was read, is a protocol violation.
pub struct PushBackSource {
    inner: Box<dyn RecordSource>,
    retained: Option<Record>,
    can_push_back: bool,
}

impl PushBackSource {
    pub fn new(inner: Box<dyn RecordSource>) -> Self {
        Self {
            inner,
            retained: None,
            can_push_back: false,
        }
    }

    /// Retain `record` so that the next `read` returns it.
    pub fn push_back(&mut self, record: Record) -> Result<()> {
        if !self.can_push_back {
            let reason = if self.retained.is_some() {
                "push_back called twice without an intervening read"
            } else {
                "push_back called before any record was read"
            };
            return Err(Error::ProtocolViolation(reason.to_string()));
        }
        tracing::trace!("Retaining record (eof: {}) for the next read", record.is_eof());
        self.retained = Some(record);
        self.can_push_back = false;
        Ok(())
    }

    /// The wrapped source.
    pub fn inner(&self) -> &dyn RecordSource {
        self.inner.as_ref()
    }
}

#[async_trait]
impl RecordSource for PushBackSource {
    fn set_context(&mut self, context: &StreamContext) {
        self.inner.set_context(context);
    }

    async fn open(&mut self) -> Result<()> {
        self.inner.open().await
    }

    async fn read(&mut self) -> Result<Record> {
        let record = match self.retained.take() {
            Some(record) => record,
            None => self.inner.read().await?,
        };
        self.can_push_back = true;
        Ok(record)
    }

    async fn close(&mut self) -> Result<()> {
        self.retained = None;
        self.can_push_back = false;
        self.inner.close().await
    }

    fn ordering(&self) -> Option<SortOrder> {
        self.inner.ordering()
    }

    fn children(&self) -> Vec<&dyn RecordSource> {
        vec![self.inner.as_ref()]
    }

    fn to_expression(&self) -> Result<StreamExpression> {
        self.inner.to_expression()
    }

    fn explain(&self) -> Explanation {
        self.inner.explain()
    }
}
