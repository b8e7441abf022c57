//! Operator configuration and the optional TOML settings file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use bump_core::{Error, Result};
use serde::Deserialize;

/// Field incremented when none is configured.
pub const DEFAULT_INCREMENT_FIELD: &str = "bump";

/// Field holding the document identifier when none is configured.
pub const DEFAULT_IDENTIFIER_FIELD: &str = "id";

/// Settings of one bump operator. Validated on construction and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpConfig {
    collection: String,
    cluster_locator: String,
    batch_size: usize,
    increment_field: String,
    identifier_field: String,
    require_identifier: bool,
}

impl BumpConfig {
    pub fn new(
        collection: impl Into<String>,
        cluster_locator: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self> {
        let config = Self {
            collection: collection.into(),
            cluster_locator: cluster_locator.into(),
            batch_size,
            increment_field: DEFAULT_INCREMENT_FIELD.to_string(),
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            require_identifier: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_increment_field(mut self, field: impl Into<String>) -> Result<Self> {
        self.increment_field = field.into();
        self.validate()?;
        Ok(self)
    }

    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Result<Self> {
        self.identifier_field = field.into();
        self.validate()?;
        Ok(self)
    }

    /// Reject records whose identifier is missing or null instead of
    /// sending a null identifier to the store.
    pub fn with_require_identifier(mut self, require: bool) -> Self {
        self.require_identifier = require;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn cluster_locator(&self) -> &str {
        &self.cluster_locator
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn increment_field(&self) -> &str {
        &self.increment_field
    }

    pub fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    pub fn require_identifier(&self) -> bool {
        self.require_identifier
    }

    fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(Error::Configuration(
                "collection name must not be empty".to_string(),
            ));
        }
        if self.cluster_locator.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "cluster locator not found for collection '{}'",
                self.collection
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batchSize '0' must be greater than 0.".to_string(),
            ));
        }
        if self.increment_field.is_empty() {
            return Err(Error::Configuration(
                "increment field name must not be empty".to_string(),
            ));
        }
        if self.identifier_field.is_empty() {
            return Err(Error::Configuration(
                "identifier field name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a textual batch size into a positive integer.
pub fn parse_batch_size(raw: &str) -> Result<usize> {
    let trimmed = raw.trim();
    let value: i64 = trimmed.parse().map_err(|_| {
        Error::Configuration(format!("batchSize '{trimmed}' is not a valid integer."))
    })?;
    if value <= 0 {
        return Err(Error::Configuration(format!(
            "batchSize '{value}' must be greater than 0."
        )));
    }
    usize::try_from(value).map_err(|_| {
        Error::Configuration(format!("batchSize '{trimmed}' is not a valid integer."))
    })
}

/// Pick the cluster locator: explicit parameter, then the locator registered
/// for the collection, then the process-wide default.
pub fn resolve_cluster_locator(
    explicit: Option<&str>,
    collection_cluster: Option<&str>,
    default_cluster: Option<&str>,
) -> Option<String> {
    explicit
        .or(collection_cluster)
        .or(default_cluster)
        .map(str::to_string)
}

/// Contents of the optional `--config` TOML file.
///
/// ```toml
/// default_cluster = "mongodb://localhost:27017/shop"
/// worker_id = "worker-1"
///
/// [collections]
/// audit = "mongodb://audit-host:27017/audit"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub default_cluster: Option<String>,
    pub worker_id: Option<String>,
    /// Collection name to cluster locator.
    #[serde(default)]
    pub collections: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
