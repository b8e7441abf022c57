use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Atomic increment of a numeric document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increment {
    /// Name of the numeric field to increment.
    pub field: String,
    /// Amount added to the field.
    pub delta: i64,
}

impl Increment {
    /// A "+1" increment of `field`.
    pub fn bump(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            delta: 1,
        }
    }
}

/// One document update: locate the document by its identifier and apply
/// the increment.
///
/// The identifier is `Value::Null` when the originating record did not carry
/// the identifier field. Null identifiers are passed to the store as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Name of the field holding the document identifier.
    pub id_field: String,
    /// Identifier value, `Value::Null` when absent.
    pub id: Value,
    pub increment: Increment,
}

impl WriteRequest {
    pub fn new(id_field: impl Into<String>, id: Value, increment: Increment) -> Self {
        Self {
            id_field: id_field.into(),
            id,
            increment,
        }
    }

    /// Whether the identifier is missing.
    pub fn has_null_id(&self) -> bool {
        self.id.is_null()
    }
}
