use crate::error::{AppError, Result};
use crate::sources::traits::{EolSource, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Rows read from a JSON array on disk
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Parse a JSON document into rows; non-object elements are rejected
    pub fn parse_rows(name: &str, content: &str) -> Result<Vec<Row>> {
        let value: Value = serde_json::from_str(content)?;
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(AppError::Source {
                    source_name: name.to_string(),
                    message: format!("expected a JSON array, found {}", json_kind(&other)),
                })
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(AppError::Source {
                    source_name: name.to_string(),
                    message: format!("element {} is {}, expected an object", index, json_kind(&other)),
                }),
            })
            .collect()
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

#[async_trait]
impl EolSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self) -> Result<Vec<Row>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Self::parse_rows(&self.name, &content)
    }
}
