//! Database schema document handed to the language model.
//!
//! The schema is a YAML mapping of table name → column name → declared type:
//!
//! ```yaml
//! call_data:
//!   id: INTEGER
//!   category_name: INTEGER
//!   district_name: TEXT
//! ```
//!
//! It is only checked for shape. Whether the tables exist in a real database
//! is the caller's business.

use crate::error::Pdf2SqlError;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSchema {
    source: PathBuf,
    tables: Mapping,
}

impl DatabaseSchema {
    /// Read and validate a schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Pdf2SqlError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Pdf2SqlError::SchemaInvalid {
            path: path.to_path_buf(),
            reason: format!("cannot read file: {e}"),
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Parse and validate schema text. `source` is only used in error messages.
    pub fn from_yaml_str(text: &str, source: impl Into<PathBuf>) -> Result<Self, Pdf2SqlError> {
        let source = source.into();
        let invalid = |reason: String| Pdf2SqlError::SchemaInvalid {
            path: source.clone(),
            reason,
        };

        let doc: Value = serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        let Value::Mapping(tables) = doc else {
            return Err(invalid("expected a mapping of table names".into()));
        };
        if tables.is_empty() {
            return Err(invalid("no tables defined".into()));
        }

        for (table, columns) in &tables {
            let table = table
                .as_str()
                .ok_or_else(|| invalid(format!("table name {} is not a string", scalar(table))))?;
            let columns = columns
                .as_mapping()
                .ok_or_else(|| invalid(format!("table '{table}' must map column names to types")))?;
            if columns.is_empty() {
                return Err(invalid(format!("table '{table}' has no columns")));
            }
            for (column, ty) in columns {
                if column.as_str().is_none() {
                    return Err(invalid(format!(
                        "table '{table}': column name {} is not a string",
                        scalar(column)
                    )));
                }
                if !matches!(ty, Value::String(_)) {
                    return Err(invalid(format!(
                        "table '{table}', column '{}': type must be a string",
                        scalar(column)
                    )));
                }
            }
        }

        debug!("Loaded schema with {} table(s) from {}", tables.len(), source.display());
        Ok(Self { source, tables })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().filter_map(Value::as_str)
    }

    /// `(column, type)` pairs of one table, in document order.
    pub fn columns(&self, table: &str) -> Option<Vec<(&str, &str)>> {
        let columns = self.tables.get(table)?.as_mapping()?;
        Some(
            columns
                .iter()
                .filter_map(|(c, t)| Some((c.as_str()?, t.as_str()?)))
                .collect(),
        )
    }

    /// The schema re-serialised as YAML, key order and non-ASCII text intact.
    pub fn to_prompt_text(&self) -> String {
        serde_yaml::to_string(&self.tables).unwrap_or_default()
    }
}

fn scalar(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}
