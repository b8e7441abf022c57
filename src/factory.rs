//! Builds pipelines from streaming expressions.

use std::collections::HashMap;
use std::sync::Arc;

use bump_core::{Error, MemorySource, RecordSource, Result, StreamExpression};
use document_store::WriterConnector;
use jsonl_source::JsonlSource;

use crate::config::Settings;
use crate::BumpStream;

/// Builds one pipeline stage from its expression. Nested stages are built
/// through the factory passed in.
pub type StreamConstructor =
    fn(&StreamExpression, &StreamFactory) -> Result<Box<dyn RecordSource>>;

/// Registry of expression functions plus the settings stages need at
/// construction time: cluster locators and the store connector.
pub struct StreamFactory {
    functions: HashMap<String, StreamConstructor>,
    collection_clusters: HashMap<String, String>,
    default_cluster: Option<String>,
    connector: Arc<dyn WriterConnector>,
}

impl StreamFactory {
    /// Factory knowing the `bump`, `jsonl` and `records` functions.
    pub fn new(connector: Arc<dyn WriterConnector>) -> Self {
        Self {
            functions: HashMap::new(),
            collection_clusters: HashMap::new(),
            default_cluster: None,
            connector,
        }
        .with_function(BumpStream::FUNCTION_NAME, construct_bump)
        .with_function(JsonlSource::FUNCTION_NAME, construct_jsonl)
        .with_function(MemorySource::FUNCTION_NAME, construct_records)
    }

    /// Apply the cluster settings of a settings file.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        if let Some(cluster) = &settings.default_cluster {
            self.default_cluster = Some(cluster.clone());
        }
        for (collection, cluster) in &settings.collections {
            self.collection_clusters
                .insert(collection.clone(), cluster.clone());
        }
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, constructor: StreamConstructor) -> Self {
        self.functions.insert(name.into(), constructor);
        self
    }

    pub fn with_collection_cluster(
        mut self,
        collection: impl Into<String>,
        cluster_locator: impl Into<String>,
    ) -> Self {
        self.collection_clusters
            .insert(collection.into(), cluster_locator.into());
        self
    }

    pub fn with_default_cluster(mut self, cluster_locator: impl Into<String>) -> Self {
        self.default_cluster = Some(cluster_locator.into());
        self
    }

    pub fn collection_cluster(&self, collection: &str) -> Option<&str> {
        self.collection_clusters.get(collection).map(String::as_str)
    }

    pub fn default_cluster(&self) -> Option<&str> {
        self.default_cluster.as_deref()
    }

    pub fn connector(&self) -> Arc<dyn WriterConnector> {
        Arc::clone(&self.connector)
    }

    pub fn construct(&self, expression: &StreamExpression) -> Result<Box<dyn RecordSource>> {
        let constructor = self.functions.get(&expression.function).ok_or_else(|| {
            Error::Configuration(format!(
                "invalid expression {expression} - unknown function '{}'",
                expression.function
            ))
        })?;
        constructor(expression, self)
    }

    /// Parse `text` and build the pipeline it describes.
    pub fn construct_str(&self, text: &str) -> Result<Box<dyn RecordSource>> {
        self.construct(&StreamExpression::parse(text)?)
    }
}

fn construct_bump(
    expression: &StreamExpression,
    factory: &StreamFactory,
) -> Result<Box<dyn RecordSource>> {
    Ok(Box::new(BumpStream::from_expression(expression, factory)?))
}

fn construct_jsonl(expression: &StreamExpression, _: &StreamFactory) -> Result<Box<dyn RecordSource>> {
    Ok(Box::new(JsonlSource::from_expression(expression)?))
}

fn construct_records(
    expression: &StreamExpression,
    _: &StreamFactory,
) -> Result<Box<dyn RecordSource>> {
    Ok(Box::new(MemorySource::from_expression(expression)?))
}

impl std::fmt::Debug for StreamFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        f.debug_struct("StreamFactory")
            .field("functions", &functions)
            .field("collection_clusters", &self.collection_clusters)
            .field("default_cluster", &self.default_cluster)
            .finish_non_exhaustive()
    }
}
