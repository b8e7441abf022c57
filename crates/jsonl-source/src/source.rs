use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bump_core::{
    Error, Explanation, ExpressionType, Record, RecordSource, Result, StreamExpression,
};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use uuid::Uuid;

/// Source reading records from a JSON Lines file.
///
/// Textual form: `jsonl(file="clicks.jsonl")` or `jsonl("clicks.jsonl")`.
pub struct JsonlSource {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_number: usize,
    exhausted: bool,
    node_id: Uuid,
}

impl JsonlSource {
    pub const FUNCTION_NAME: &'static str = "jsonl";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
            line_number: 0,
            exhausted: false,
            node_id: Uuid::new_v4(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn from_expression(expression: &StreamExpression) -> Result<Self> {
        let path = expression
            .named_value("file")
            .or_else(|| expression.value_at(0))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "invalid expression {expression} - expecting a file path"
                ))
            })?;
        Ok(Self::new(path))
    }
}

#[async_trait]
impl RecordSource for JsonlSource {
    async fn open(&mut self) -> Result<()> {
        let file = File::open(&self.path).await.map_err(|e| {
            Error::Source(format!("failed to open {}: {e}", self.path.display()))
        })?;
        tracing::debug!("Opened JSON Lines source {}", self.path.display());
        self.lines = Some(BufReader::new(file).lines());
        self.line_number = 0;
        self.exhausted = false;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.exhausted {
            return Ok(Record::eof());
        }
        let lines = self.lines.as_mut().ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "read() called on JSON Lines source {} that is not open",
                self.path.display()
            ))
        })?;

        loop {
            let line = lines.next_line().await.map_err(|e| {
                Error::Source(format!(
                    "failed to read {} after line {}: {e}",
                    self.path.display(),
                    self.line_number
                ))
            })?;
            let Some(line) = line else {
                tracing::debug!(
                    "Reached end of {} after {} lines",
                    self.path.display(),
                    self.line_number
                );
                self.exhausted = true;
                return Ok(Record::eof());
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                Error::Source(format!(
                    "{}:{}: invalid JSON: {e}",
                    self.path.display(),
                    self.line_number
                ))
            })?;
            return Record::from_json(value).map_err(|e| {
                Error::Source(format!(
                    "{}:{}: {e}",
                    self.path.display(),
                    self.line_number
                ))
            });
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.lines = None;
        Ok(())
    }

    fn to_expression(&self) -> Result<StreamExpression> {
        let path = self.path.to_str().ok_or_else(|| {
            Error::Configuration(format!(
                "path {} is not valid UTF-8",
                self.path.display()
            ))
        })?;
        Ok(StreamExpression::new(Self::FUNCTION_NAME).with_named("file", path))
    }

    fn explain(&self) -> Explanation {
        Explanation {
            node_id: self.node_id.to_string(),
            function_name: Self::FUNCTION_NAME.to_string(),
            implementing_type: std::any::type_name::<Self>().to_string(),
            expression_type: ExpressionType::StreamSource,
            expression: self
                .to_expression()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_objects_and_skips_blank_lines() {
        let file = write_lines("{\"id\":\"a\"}\n\n  \n{\"id\":\"b\",\"qty\":2}\n");
        let mut source = JsonlSource::new(file.path());
        source.open().await.unwrap();

        assert_eq!(source.read().await.unwrap().get("id"), Some(&json!("a")));
        let second = source.read().await.unwrap();
        assert_eq!(second.get("qty"), Some(&json!(2)));
        assert!(source.read().await.unwrap().is_eof());
        assert!(source.read().await.unwrap().is_eof());
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_object_line_reports_line_number() {
        let file = write_lines("{\"id\":\"a\"}\n[1,2]\n");
        let mut source = JsonlSource::new(file.path());
        source.open().await.unwrap();

        source.read().await.unwrap();
        let err = source.read().await.unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert!(err.to_string().contains(":2:"), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_json_line() {
        let file = write_lines("{not json}\n");
        let mut source = JsonlSource::new(file.path());
        source.open().await.unwrap();

        let err = source.read().await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_read_before_open() {
        let mut source = JsonlSource::new("never-opened.jsonl");
        assert!(source.read().await.unwrap_err().is_protocol_violation());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = JsonlSource::new(dir.path().join("missing.jsonl"));
        let err = source.open().await.unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn test_expression_forms() {
        let named: StreamExpression = r#"jsonl(file="/tmp/clicks.jsonl")"#.parse().unwrap();
        let positional: StreamExpression = "jsonl(/tmp/clicks.jsonl)".parse().unwrap();

        for expression in [named, positional] {
            let source = JsonlSource::from_expression(&expression).unwrap();
            assert_eq!(source.path(), Path::new("/tmp/clicks.jsonl"));
            assert_eq!(
                source.to_expression().unwrap().to_string(),
                "jsonl(file=/tmp/clicks.jsonl)"
            );
        }

        let empty: StreamExpression = "jsonl()".parse().unwrap();
        assert!(JsonlSource::from_expression(&empty)
            .err()
            .unwrap()
            .is_configuration());
    }
}
