use thiserror::Error;

/// Errors reported by a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (network, DNS, server selection).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with a command-level failure.
    #[error("Server error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Server { code: Option<i32>, message: String },

    /// The command was accepted but some of the individual writes were rejected.
    #[error("{failed} write(s) rejected: {message}")]
    Rejected { failed: usize, message: String },

    /// A value could not be encoded for the store.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid connection settings (bad URI, missing database, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Short, stable name of the failure category.
    ///
    /// Used when the failure is wrapped into a pipeline-level error so that
    /// callers can tell unreachable stores apart from rejected writes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Server { .. } => "server",
            Self::Rejected { .. } => "rejected",
            Self::Encoding(_) => "encoding",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Message of the underlying cause, without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Transport(message)
            | Self::Encoding(message)
            | Self::Configuration(message) => message.clone(),
            Self::Server { message, .. } | Self::Rejected { message, .. } => message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
