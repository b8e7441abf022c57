//! Record representation.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Field set on the JSON form of the end-of-stream sentinel.
pub const EOF_FIELD: &str = "EOF";

/// One unit flowing through a pipeline.
///
/// A record is an ordered mapping from field name to JSON value. The
/// end-of-stream sentinel is a record with the `eof` flag set and no fields;
/// sources return it once they have no more records to produce.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Map<String, Value>,
    eof: bool,
}

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields, eof: false }
    }

    /// The end-of-stream sentinel.
    pub fn eof() -> Self {
        Self {
            fields: Map::new(),
            eof: true,
        }
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(Error::InvalidRecord(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON form of the record. The sentinel renders as `{"EOF": true}`.
    pub fn to_json(&self) -> Value {
        if self.eof {
            let mut fields = Map::new();
            fields.insert(EOF_FIELD.to_string(), Value::Bool(true));
            Value::Object(fields)
        } else {
            Value::Object(self.fields.clone())
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
