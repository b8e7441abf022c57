//! Per-operator flush accounting and the summary record emitted per batch.

use bump_core::Record;
use serde_json::{json, Value};

/// Summary field: number of documents incremented by the batch.
pub const BATCH_BUMPED_FIELD: &str = "batchBumped";
/// Summary field: documents incremented so far by this operator.
pub const TOTAL_BUMPED_FIELD: &str = "totalBumped";
/// Summary field: 1-based sequence number of the batch.
pub const BATCH_NUMBER_FIELD: &str = "batchNumber";
/// Summary field: worker that ran the operator, when known.
pub const WORKER_FIELD: &str = "worker";

/// Outcome of one successful flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub batch_applied_count: usize,
    pub cumulative_applied_count: i64,
    pub batch_sequence_number: u64,
    pub worker_id: Option<String>,
}

impl SummaryRecord {
    pub fn into_record(self) -> Record {
        let mut fields: Vec<(&str, Value)> = vec![
            (BATCH_BUMPED_FIELD, json!(self.batch_applied_count)),
            (TOTAL_BUMPED_FIELD, json!(self.cumulative_applied_count)),
            (BATCH_NUMBER_FIELD, json!(self.batch_sequence_number)),
        ];
        if let Some(worker) = self.worker_id {
            fields.push((WORKER_FIELD, Value::String(worker)));
        }
        fields.into_iter().collect()
    }

    /// Read a summary back from an emitted record. `None` for any other record.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            batch_applied_count: usize::try_from(record.get(BATCH_BUMPED_FIELD)?.as_u64()?).ok()?,
            cumulative_applied_count: record.get(TOTAL_BUMPED_FIELD)?.as_i64()?,
            batch_sequence_number: record.get(BATCH_NUMBER_FIELD)?.as_u64()?,
            worker_id: record
                .get(WORKER_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Running totals of one operator instance.
#[derive(Debug, Default)]
pub struct Accounting {
    cumulative_applied_count: i64,
    batch_sequence_number: u64,
    worker_id: Option<String>,
}

impl Accounting {
    pub fn set_worker_id(&mut self, worker_id: Option<String>) {
        self.worker_id = worker_id;
    }

    /// Account for a flush of `applied_count` requests, which must be positive.
    pub fn record_flush(&mut self, applied_count: usize) -> SummaryRecord {
        debug_assert!(applied_count > 0, "flushed an empty batch");
        self.cumulative_applied_count += applied_count as i64;
        self.batch_sequence_number += 1;
        SummaryRecord {
            batch_applied_count: applied_count,
            cumulative_applied_count: self.cumulative_applied_count,
            batch_sequence_number: self.batch_sequence_number,
            worker_id: self.worker_id.clone(),
        }
    }

    pub fn cumulative_applied_count(&self) -> i64 {
        self.cumulative_applied_count
    }

    pub fn batch_sequence_number(&self) -> u64 {
        self.batch_sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_flush() {
        let mut accounting = Accounting::default();
        let first = accounting.record_flush(3);
        let second = accounting.record_flush(1);

        assert_eq!(first.cumulative_applied_count, 3);
        assert_eq!(first.batch_sequence_number, 1);
        assert_eq!(second.batch_applied_count, 1);
        assert_eq!(second.cumulative_applied_count, 4);
        assert_eq!(second.batch_sequence_number, 2);
        assert_eq!(accounting.cumulative_applied_count(), 4);
    }

    #[test]
    fn test_summary_record_fields() {
        let mut accounting = Accounting::default();
        accounting.set_worker_id(Some("shard1_replica_n1".to_string()));
        let record = accounting.record_flush(2).into_record();

        let keys: Vec<&str> = record.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["batchBumped", "totalBumped", "batchNumber", "worker"]);
        assert_eq!(record.get("worker"), Some(&json!("shard1_replica_n1")));

        let summary = SummaryRecord::from_record(&record).unwrap();
        assert_eq!(summary.batch_applied_count, 2);
        assert_eq!(summary.worker_id.as_deref(), Some("shard1_replica_n1"));
    }

    #[test]
    fn test_worker_is_omitted_when_unknown() {
        let record = Accounting::default().record_flush(1).into_record();
        assert!(!record.contains(WORKER_FIELD));
        assert!(SummaryRecord::from_record(&Record::eof()).is_none());
    }
}
