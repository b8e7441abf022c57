//! The bump operator.
//!
//! `BumpStream` pulls records from its upstream, turns each one into a
//! `$inc` of the configured field on the document with the record's
//! identifier, and writes them in batches of `batchSize`. Every successful
//! batch produces one summary record; once the upstream is exhausted and
//! nothing is pending, end-of-stream is forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use bump_core::{
    Error, Explanation, ExpressionParam, ExpressionType, PushBackSource, Record, RecordSource,
    Result, SortOrder, StreamContext, StreamExpression,
};
use document_store::{WriteRequest, WriterConnector};
use uuid::Uuid;

use crate::accounting::Accounting;
use crate::accumulator::BatchAccumulator;
use crate::config::{
    parse_batch_size, resolve_cluster_locator, DEFAULT_IDENTIFIER_FIELD, DEFAULT_INCREMENT_FIELD,
};
use crate::gateway::WriterGateway;
use crate::{BumpConfig, StreamFactory};

/// Placeholder standing in for the upstream in the explain tree.
const STREAM_PLACEHOLDER: &str = "<stream>";

/// Where the operator is in its pull cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Between reads.
    Ready,
    /// Pulling records into the pending batch.
    ReadingBatch,
    /// Writing the pending batch.
    Flushing,
    /// End-of-stream has been returned; no further reads are allowed.
    Terminated,
}

pub struct BumpStream {
    config: BumpConfig,
    source: PushBackSource,
    connector: Arc<dyn WriterConnector>,
    context: StreamContext,
    gateway: Option<WriterGateway>,
    batch: BatchAccumulator,
    accounting: Accounting,
    phase: Phase,
    node_id: Uuid,
}

impl BumpStream {
    pub const FUNCTION_NAME: &'static str = "bump";

    pub fn new(
        config: BumpConfig,
        source: Box<dyn RecordSource>,
        connector: Arc<dyn WriterConnector>,
    ) -> Self {
        let batch = BatchAccumulator::new(&config);
        Self {
            config,
            source: PushBackSource::new(source),
            connector,
            context: StreamContext::default(),
            gateway: None,
            batch,
            accounting: Accounting::default(),
            phase: Phase::Ready,
            node_id: Uuid::new_v4(),
        }
    }

    /// Build from the textual form
    /// `bump(<collection>, batchSize=<n>, cluster=<locator>, field=<name>, id=<name>, <stream>)`.
    ///
    /// Validation happens here, before any connection is made: collection,
    /// cluster locator, batch size, field names, then the single upstream.
    pub fn from_expression(expression: &StreamExpression, factory: &StreamFactory) -> Result<Self> {
        let invalid = |reason: String| {
            Error::Configuration(format!("invalid expression {expression} - {reason}"))
        };

        let collection = expression
            .value_at(0)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| invalid("collectionName expected as first operand".to_string()))?;

        let explicit_cluster = match expression.named("cluster") {
            None => None,
            Some(ExpressionParam::Value(locator)) => Some(locator.as_str()),
            Some(_) => return Err(invalid("'cluster' must be a plain value".to_string())),
        };
        let cluster_locator = resolve_cluster_locator(
            explicit_cluster,
            factory.collection_cluster(collection),
            factory.default_cluster(),
        )
        .ok_or_else(|| invalid(format!("cluster not found for collection '{collection}'")))?;

        let batch_size = expression.named_value("batchSize").ok_or_else(|| {
            invalid(
                "expecting a 'batchSize' parameter of type positive integer but didn't find one"
                    .to_string(),
            )
        })?;
        let batch_size = parse_batch_size(batch_size).map_err(|e| match e {
            Error::Configuration(reason) => invalid(reason),
            other => other,
        })?;

        let increment_field = named_or_default(expression, "field", DEFAULT_INCREMENT_FIELD)
            .map_err(&invalid)?;
        let identifier_field =
            named_or_default(expression, "id", DEFAULT_IDENTIFIER_FIELD).map_err(&invalid)?;
        let require_identifier = match named_or_default(expression, "requireId", "false")
            .map_err(&invalid)?
        {
            "true" => true,
            "false" => false,
            other => {
                return Err(invalid(format!(
                    "requireId '{other}' must be true or false"
                )))
            }
        };

        let streams = expression.expressions();
        if streams.len() != 1 {
            return Err(invalid(format!(
                "expecting a single stream but found {}",
                streams.len()
            )));
        }

        let config = BumpConfig::new(collection, cluster_locator, batch_size)?
            .with_increment_field(increment_field)?
            .with_identifier_field(identifier_field)?
            .with_require_identifier(require_identifier);
        let source = factory.construct(streams[0])?;

        Ok(Self::new(config, source, factory.connector()))
    }

    pub fn config(&self) -> &BumpConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of requests waiting to be written.
    ///
    /// Non-zero between reads only after a failed write.
    pub fn pending_len(&self) -> usize {
        self.batch.len()
    }

    /// Drop the batch retained after a failed write, returning it.
    pub fn take_pending(&mut self) -> Vec<WriteRequest> {
        let pending = self.batch.take();
        if !pending.is_empty() {
            tracing::info!(
                "Discarding {} pending increments for collection '{}'",
                pending.len(),
                self.config.collection()
            );
        }
        pending
    }

    pub fn total_bumped(&self) -> i64 {
        self.accounting.cumulative_applied_count()
    }

    pub fn batch_number(&self) -> u64 {
        self.accounting.batch_sequence_number()
    }

    /// Fill the batch and flush it, or return end-of-stream.
    async fn next_record(&mut self) -> Result<Record> {
        self.phase = Phase::ReadingBatch;
        while !self.batch.is_full() {
            let record = self.source.read().await?;
            if record.is_eof() {
                if self.batch.is_empty() {
                    tracing::debug!(
                        "Upstream exhausted after {} batches for collection '{}'",
                        self.accounting.batch_sequence_number(),
                        self.config.collection()
                    );
                    self.phase = Phase::Terminated;
                    return Ok(record);
                }
                // Flush what we have; end-of-stream is returned on the next read.
                self.source.push_back(record)?;
                break;
            }
            self.batch.accept(&record)?;
        }
        self.flush().await
    }

    async fn flush(&mut self) -> Result<Record> {
        self.phase = Phase::Flushing;
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            Error::ProtocolViolation("flush without an open store connection".to_string())
        })?;
        gateway.write_batch(self.batch.pending()).await?;

        let applied = self.batch.len();
        self.batch.clear();
        let summary = self.accounting.record_flush(applied);
        tracing::debug!(
            "Bumped {} documents in collection '{}' (batch {}, total {})",
            summary.batch_applied_count,
            self.config.collection(),
            summary.batch_sequence_number,
            summary.cumulative_applied_count
        );
        self.phase = Phase::Ready;
        Ok(summary.into_record())
    }

    /// Textual form with `stream` in place of the upstream.
    fn expression_with(&self, stream: ExpressionParam) -> StreamExpression {
        let mut expression = StreamExpression::new(Self::FUNCTION_NAME)
            .with_value(self.config.collection())
            .with_named("cluster", self.config.cluster_locator())
            .with_named("batchSize", self.config.batch_size().to_string())
            .with_named("field", self.config.increment_field())
            .with_named("id", self.config.identifier_field());
        if self.config.require_identifier() {
            expression = expression.with_named("requireId", "true");
        }
        expression.params.push(stream);
        expression
    }
}

fn named_or_default<'a>(
    expression: &'a StreamExpression,
    name: &str,
    default: &'a str,
) -> std::result::Result<&'a str, String> {
    match expression.named(name) {
        None => Ok(default),
        Some(ExpressionParam::Value(value)) => Ok(value),
        Some(_) => Err(format!("'{name}' must be a plain value")),
    }
}

/// Name of the store behind `cluster_locator`, from its URI scheme.
fn datastore_name(cluster_locator: &str) -> &str {
    match cluster_locator.split_once("://") {
        Some((scheme, _)) => scheme.split('+').next().unwrap_or(scheme),
        None => "store",
    }
}

#[async_trait]
impl RecordSource for BumpStream {
    fn set_context(&mut self, context: &StreamContext) {
        self.accounting
            .set_worker_id(context.worker_id().map(str::to_string));
        self.source.set_context(context);
        self.context = context.clone();
    }

    async fn open(&mut self) -> Result<()> {
        if self.gateway.is_some() {
            return Err(Error::ProtocolViolation(
                "open() called on a bump stream that is already open".to_string(),
            ));
        }

        let gateway = WriterGateway::connect(
            self.config.collection(),
            self.config.cluster_locator(),
            &self.context,
            &self.connector,
        )
        .await?;

        if let Err(e) = self.source.open().await {
            if let Err(release_error) = gateway.release().await {
                tracing::warn!("Failed to release store connection: {release_error}");
            }
            return Err(e);
        }

        tracing::info!(
            "Opened bump stream on collection '{}' (batch size {}, owned connection: {})",
            self.config.collection(),
            self.config.batch_size(),
            gateway.is_owned()
        );
        self.gateway = Some(gateway);
        self.phase = Phase::Ready;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.phase == Phase::Terminated {
            return Err(Error::ProtocolViolation(
                "read() called after end-of-stream was returned".to_string(),
            ));
        }
        if self.gateway.is_none() {
            return Err(Error::ProtocolViolation(
                "read() called on a bump stream that is not open".to_string(),
            ));
        }

        let result = self.next_record().await;
        if result.is_err() {
            // The pending batch is kept so a retry re-sends it.
            self.phase = Phase::Ready;
        }
        result
    }

    async fn close(&mut self) -> Result<()> {
        if !self.batch.is_empty() {
            tracing::warn!(
                "Closing bump stream with {} unwritten increments for collection '{}'",
                self.batch.len(),
                self.config.collection()
            );
            self.batch.clear();
        }

        let source_result = self.source.close().await;
        let release_result = match self.gateway.take() {
            Some(gateway) => gateway.release().await,
            None => Ok(()),
        };
        self.phase = Phase::Ready;

        tracing::info!(
            "Closed bump stream on collection '{}' after {} batches ({} documents)",
            self.config.collection(),
            self.accounting.batch_sequence_number(),
            self.accounting.cumulative_applied_count()
        );
        source_result?;
        release_result
    }

    fn ordering(&self) -> Option<SortOrder> {
        self.source.ordering()
    }

    fn children(&self) -> Vec<&dyn RecordSource> {
        vec![self.source.inner()]
    }

    fn to_expression(&self) -> Result<StreamExpression> {
        let upstream = self.source.to_expression()?;
        Ok(self.expression_with(ExpressionParam::Expression(upstream)))
    }

    /// The written collection is the root of the tree; this operator is its
    /// child and the upstream hangs below it.
    fn explain(&self) -> Explanation {
        let collection = self.config.collection();
        let store = datastore_name(self.config.cluster_locator());

        let operator = Explanation {
            node_id: self.node_id.to_string(),
            function_name: Self::FUNCTION_NAME.to_string(),
            implementing_type: std::any::type_name::<Self>().to_string(),
            expression_type: ExpressionType::StreamDecorator,
            expression: self
                .expression_with(ExpressionParam::Value(STREAM_PLACEHOLDER.to_string()))
                .to_string(),
            children: vec![self.source.explain()],
        };

        Explanation {
            node_id: format!("{}-datastore", self.node_id),
            function_name: format!("{store} ({collection})"),
            implementing_type: store.to_string(),
            expression_type: ExpressionType::Datastore,
            expression: format!("Update into {collection}"),
            children: vec![operator],
        }
    }
}
