//! RecordSource trait definition.

use async_trait::async_trait;

use crate::{Error, Explanation, Record, Result, StreamContext, StreamExpression};

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One field of a sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Order in which a source emits its records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub keys: Vec<SortKey>,
}

impl SortOrder {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![SortKey {
                field: field.into(),
                direction: SortDirection::Ascending,
            }],
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let direction = match key.direction {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            };
            write!(f, "{} {}", key.field, direction)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    /// Parse `field [asc|desc], ...`. Direction defaults to ascending.
    fn from_str(s: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for part in s.split(',') {
            let mut tokens = part.split_whitespace();
            let field = tokens
                .next()
                .ok_or_else(|| Error::Configuration(format!("empty sort key in '{s}'")))?;
            let direction = match tokens.next().map(str::to_lowercase).as_deref() {
                None | Some("asc") => SortDirection::Ascending,
                Some("desc") => SortDirection::Descending,
                Some(other) => {
                    return Err(Error::Configuration(format!(
                        "invalid sort direction '{other}' in '{s}'"
                    )))
                }
            };
            if tokens.next().is_some() {
                return Err(Error::Configuration(format!("invalid sort key '{part}'")));
            }
            keys.push(SortKey {
                field: field.to_string(),
                direction,
            });
        }
        Ok(Self { keys })
    }
}

/// Pull-based pipeline stage.
///
/// Callers `open` a source, call `read` until it returns the end-of-stream
/// sentinel (see [`Record::is_eof`]), then `close` it. One caller drives a
/// source at a time; calls are awaited sequentially.
///
/// Decorators (stages wrapping another source) forward `set_context`,
/// `open` and `close` to their child and report it from `children`.
#[async_trait]
pub trait RecordSource: Send {
    /// Hand run-wide settings to this stage before it is opened.
    fn set_context(&mut self, _context: &StreamContext) {}

    async fn open(&mut self) -> Result<()>;

    /// Next record, or the end-of-stream sentinel.
    async fn read(&mut self) -> Result<Record>;

    async fn close(&mut self) -> Result<()>;

    /// Order of emitted records, if the source guarantees one.
    fn ordering(&self) -> Option<SortOrder> {
        None
    }

    /// Direct child stages, for pipeline-tree traversal.
    fn children(&self) -> Vec<&dyn RecordSource> {
        Vec::new()
    }

    /// Textual form this stage can be rebuilt from.
    fn to_expression(&self) -> Result<StreamExpression>;

    fn explain(&self) -> Explanation;
}
