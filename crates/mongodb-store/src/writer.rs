//! MongoDB `DocumentWriter` implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use document_store::{DocumentWriter, Result, StoreError, WriteRequest, WriterConnector};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Writer bound to one MongoDB database.
pub struct MongoWriter {
    client: Client,
    database: Database,
}

impl MongoWriter {
    pub fn new(client: Client, database_name: &str) -> Self {
        let database = client.database(database_name);
        Self { client, database }
    }

    /// Round-trip a `ping` to make sure the deployment is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentWriter for MongoWriter {
    async fn write_batch(&self, collection: &str, batch: &[WriteRequest]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let command = build_update_command(collection, batch)?;
        tracing::debug!(
            "Sending {} $inc updates to {}.{}",
            batch.len(),
            self.database.name(),
            collection
        );
        let reply = self
            .database
            .run_command(command)
            .await
            .map_err(store_error)?;
        check_update_reply(&reply)?;

        tracing::trace!("Update reply: {reply:?}");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::debug!("Shutting down MongoDB client");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Build the `update` command applying every request of `batch`.
///
/// Each request becomes an upserting statement, so a document that does not
/// exist yet is created with the incremented field.
pub fn build_update_command(collection: &str, batch: &[WriteRequest]) -> Result<Document> {
    let mut updates = Vec::with_capacity(batch.len());
    for request in batch {
        let id = bson::to_bson(&request.id).map_err(|e| {
            StoreError::Encoding(format!("identifier {} cannot be encoded: {e}", request.id))
        })?;

        let mut filter = Document::new();
        filter.insert(&request.id_field, id);
        let mut increment = Document::new();
        increment.insert(&request.increment.field, request.increment.delta);

        updates.push(Bson::Document(doc! {
            "q": filter,
            "u": { "$inc": increment },
            "upsert": true,
        }));
    }

    Ok(doc! {
        "update": collection,
        "updates": updates,
        "ordered": true,
    })
}

/// Turn write errors reported inside a successful reply into a `StoreError`.
pub fn check_update_reply(reply: &Document) -> Result<()> {
    if let Ok(errors) = reply.get_array("writeErrors") {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(Bson::as_document)
                .find_map(|error| error.get_str("errmsg").ok())
                .unwrap_or("unknown write error")
                .to_string();
            return Err(StoreError::Rejected {
                failed: errors.len(),
                message,
            });
        }
    }

    if let Ok(error) = reply.get_document("writeConcernError") {
        return Err(StoreError::Server {
            code: error.get_i32("code").ok(),
            message: error
                .get_str("errmsg")
                .unwrap_or("write concern error")
                .to_string(),
        });
    }

    Ok(())
}

fn store_error(error: mongodb::error::Error) -> StoreError {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => StoreError::Server {
            code: Some(command.code),
            message: command.message.clone(),
        },
        ErrorKind::InvalidArgument { message, .. } => StoreError::Configuration(message.clone()),
        _ => StoreError::Transport(error.to_string()),
    }
}

/// Connects `MongoWriter`s from MongoDB connection strings.
///
/// The database is taken from the connection string path
/// (`mongodb://host:27017/shop`), falling back to the configured default.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    database: Option<String>,
    connect_timeout: Duration,
}

impl Default for MongoConnector {
    fn default() -> Self {
        Self {
            database: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl MongoConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database used when the connection string does not name one.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Connect and server selection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl WriterConnector for MongoConnector {
    async fn connect(&self, cluster_locator: &str) -> Result<Arc<dyn DocumentWriter>> {
        let mut options = ClientOptions::parse(cluster_locator)
            .await
            .map_err(store_error)?;
        // Add connection timeout to prevent hanging
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        let database = options
            .default_database
            .clone()
            .or_else(|| self.database.clone())
            .ok_or_else(|| {
                StoreError::Configuration(
                    "connection string names no database and no default database is configured"
                        .to_string(),
                )
            })?;

        let client = Client::with_options(options).map_err(store_error)?;
        let writer = MongoWriter::new(client, &database);
        writer.ping().await?;
        tracing::info!("Connected to MongoDB database '{database}'");

        Ok(Arc::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use document_store::Increment;
    use serde_json::{json, Value};

    #[test]
    fn test_build_update_command() {
        let batch = vec![
            WriteRequest::new("sku", json!("p-1"), Increment::bump("popularity")),
            WriteRequest::new("sku", json!(42), Increment::bump("popularity")),
        ];
        let command = build_update_command("products", &batch).unwrap();

        assert_eq!(command.get_str("update").unwrap(), "products");
        assert!(command.get_bool("ordered").unwrap());

        let updates = command.get_array("updates").unwrap();
        assert_eq!(updates.len(), 2);

        let first = updates[0].as_document().unwrap();
        assert_eq!(
            first.get_document("q").unwrap(),
            &doc! { "sku": "p-1" }
        );
        assert_eq!(
            first.get_document("u").unwrap(),
            &doc! { "$inc": { "popularity": 1_i64 } }
        );
        assert!(first.get_bool("upsert").unwrap());

        let second = updates[1].as_document().unwrap();
        assert_eq!(second.get_document("q").unwrap(), &doc! { "sku": 42_i64 });
    }

    #[test]
    fn test_null_identifier_is_passed_through() {
        let batch = vec![WriteRequest::new("id", Value::Null, Increment::bump("bump"))];
        let command = build_update_command("c", &batch).unwrap();
        let update = command.get_array("updates").unwrap()[0]
            .as_document()
            .unwrap()
            .clone();
        assert_eq!(update.get_document("q").unwrap(), &doc! { "id": Bson::Null });
    }

    #[test]
    fn test_check_reply_ok() {
        assert!(check_update_reply(&doc! { "ok": 1, "n": 2, "nModified": 1 }).is_ok());
        assert!(check_update_reply(&doc! { "ok": 1, "writeErrors": [] }).is_ok());
    }

    #[test]
    fn test_check_reply_write_errors() {
        let reply = doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [
                { "index": 1, "code": 14, "errmsg": "Cannot apply $inc to a value of non-numeric type" },
            ],
        };
        let err = check_update_reply(&reply).unwrap_err();
        assert_eq!(err.category(), "rejected");
        assert!(err.message().contains("non-numeric"));
    }

    #[test]
    fn test_check_reply_write_concern_error() {
        let reply = doc! {
            "ok": 1,
            "writeConcernError": { "code": 64, "errmsg": "waiting for replication timed out" },
        };
        let err = check_update_reply(&reply).unwrap_err();
        assert_eq!(
            err,
            StoreError::Server {
                code: Some(64),
                message: "waiting for replication timed out".to_string()
            }
        );
    }

    #[test]
    fn test_connector_defaults() {
        let connector = MongoConnector::new().with_database("shop");
        assert_eq!(connector.database.as_deref(), Some("shop"));
        assert_eq!(connector.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }
}
