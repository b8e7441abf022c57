//! Record to write-request conversion and the pending batch buffer.

use bump_core::{Error, Record, Result};
use document_store::{Increment, WriteRequest};
use serde_json::Value;

use crate::BumpConfig;

/// Build the increment request for `record`.
///
/// A record without `identifier_field` yields a request with a null
/// identifier.
pub fn to_write_request(
    record: &Record,
    identifier_field: &str,
    increment_field: &str,
) -> WriteRequest {
    let id = record.get(identifier_field).cloned().unwrap_or(Value::Null);
    WriteRequest::new(identifier_field, id, Increment::bump(increment_field))
}

/// Bounded buffer of write requests waiting to be flushed.
#[derive(Debug)]
pub struct BatchAccumulator {
    identifier_field: String,
    increment_field: String,
    require_identifier: bool,
    capacity: usize,
    pending: Vec<WriteRequest>,
}

impl BatchAccumulator {
    pub fn new(config: &BumpConfig) -> Self {
        Self {
            identifier_field: config.identifier_field().to_string(),
            increment_field: config.increment_field().to_string(),
            require_identifier: config.require_identifier(),
            capacity: config.batch_size(),
            pending: Vec::with_capacity(config.batch_size()),
        }
    }

    /// Convert `record` and append it to the batch.
    pub fn accept(&mut self, record: &Record) -> Result<()> {
        if record.is_eof() {
            return Err(Error::ProtocolViolation(
                "end-of-stream cannot be added to a batch".to_string(),
            ));
        }
        if self.is_full() {
            return Err(Error::ProtocolViolation(format!(
                "batch already holds {} requests",
                self.capacity
            )));
        }

        let request = to_write_request(record, &self.identifier_field, &self.increment_field);
        if self.require_identifier && request.has_null_id() {
            return Err(Error::InvalidRecord(format!(
                "record has no value for identifier field '{}'",
                self.identifier_field
            )));
        }
        tracing::trace!("Queued increment for {}={}", request.id_field, request.id);
        self.pending.push(request);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[WriteRequest] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return everything pending.
    pub fn take(&mut self) -> Vec<WriteRequest> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity))
    }
}
