//! Source over an in-memory list of records.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Error, Explanation, ExpressionType, Record, RecordSource, Result, SortOrder, StreamExpression,
};

/// Counters observing the lifecycle of a [`MemorySource`].
///
/// Clones share the counters, so a probe taken before the source is moved
/// into a pipeline still reports what happened to it.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of `read` calls, including those returning end-of-stream.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Source emitting a fixed list of records, then end-of-stream forever.
///
/// Textual form: `records("{\"id\":\"a\"}", "{\"id\":\"b\"}", sort="id asc")`.
pub struct MemorySource {
    records: Vec<Record>,
    pending: VecDeque<Record>,
    ordering: Option<SortOrder>,
    probe: SourceProbe,
    node_id: Uuid,
    opened: bool,
}

impl MemorySource {
    pub const FUNCTION_NAME: &'static str = "records";

    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            pending: VecDeque::new(),
            ordering: None,
            probe: SourceProbe::default(),
            node_id: Uuid::new_v4(),
            opened: false,
        }
    }

    pub fn with_ordering(mut self, ordering: SortOrder) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    /// Build from `records(<json object>..., sort=<order>)`.
    pub fn from_expression(expression: &StreamExpression) -> Result<Self> {
        let mut records = Vec::new();
        for raw in expression.positional_values() {
            let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                Error::Configuration(format!(
                    "invalid expression {expression} - record '{raw}' is not valid JSON: {e}"
                ))
            })?;
            records.push(Record::from_json(value).map_err(|e| {
                Error::Configuration(format!("invalid expression {expression} - {e}"))
            })?);
        }

        let mut source = Self::new(records);
        if let Some(sort) = expression.named_value("sort") {
            source.ordering = Some(sort.parse()?);
        }
        Ok(source)
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn open(&mut self) -> Result<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        self.pending = self.records.iter().cloned().collect();
        self.opened = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if !self.opened {
            return Err(Error::ProtocolViolation(
                "read() called on a records source that is not open".to_string(),
            ));
        }
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending.pop_front().unwrap_or_else(Record::eof))
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
        self.opened = false;
        Ok(())
    }

    fn ordering(&self) -> Option<SortOrder> {
        self.ordering.clone()
    }

    fn to_expression(&self) -> Result<StreamExpression> {
        let mut expression = StreamExpression::new(Self::FUNCTION_NAME);
        for record in &self.records {
            expression = expression.with_value(serde_json::to_string(&record.to_json())?);
        }
        if let Some(ordering) = &self.ordering {
            expression = expression.with_named("sort", ordering.to_string());
        }
        Ok(expression)
    }

    fn explain(&self) -> Explanation {
        Explanation {
            node_id: self.node_id.to_string(),
            function_name: Self::FUNCTION_NAME.to_string(),
            implementing_type: std::any::type_name::<Self>().to_string(),
            expression_type: ExpressionType::StreamSource,
            expression: self
                .to_expression()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            children: Vec::new(),
        }
    }
}
