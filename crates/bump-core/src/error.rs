use thiserror::Error;

/// Errors raised while building or running a pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing construction parameters. Raised before any I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store rejected a batch or could not be reached while writing it.
    #[error(
        "Unexpected error when bumping documents in collection {collection} - {category}: {message}"
    )]
    WriteFailure {
        collection: String,
        category: String,
        message: String,
    },

    /// The store connection could not be established.
    #[error("Unable to connect to cluster '{cluster}' - {category}: {message}")]
    Connection {
        cluster: String,
        category: String,
        message: String,
    },

    /// Misuse of the pull protocol. Indicates a programming error.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A record could not be accepted.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The upstream source failed to produce a record.
    #[error("Source error: {0}")]
    Source(String),

    /// Textual expression could not be parsed.
    #[error("Invalid expression: {0}")]
    Expression(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
