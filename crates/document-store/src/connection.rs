use std::sync::Arc;

use crate::{DocumentWriter, Result};

/// A writer held by an operator, tagged with who owns it.
///
/// `Owned` writers were opened by the operator and are shut down when it
/// releases the connection. `Borrowed` writers belong to a shared
/// [`WriterRegistry`](crate::WriterRegistry); releasing them is a no-op.
pub enum StoreConnection {
    Owned(Arc<dyn DocumentWriter>),
    Borrowed(Arc<dyn DocumentWriter>),
}

impl StoreConnection {
    pub fn writer(&self) -> &dyn DocumentWriter {
        match self {
            Self::Owned(writer) | Self::Borrowed(writer) => writer.as_ref(),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Give the connection up. Shuts the writer down only when owned.
    pub async fn release(self) -> Result<()> {
        match self {
            Self::Owned(writer) => {
                tracing::debug!("Shutting down operator-owned store connection");
                writer.shutdown().await
            }
            Self::Borrowed(_) => {
                tracing::debug!("Returning borrowed store connection to registry");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned(_) => f.write_str("StoreConnection::Owned"),
            Self::Borrowed(_) => f.write_str("StoreConnection::Borrowed"),
        }
    }
}
