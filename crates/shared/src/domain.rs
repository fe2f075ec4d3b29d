use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataShapeError;

/// Stable, host-assigned identifier of one rendered visualization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Pending,
    Ready,
    Failed,
}

/// One record of a dataset: field name -> scalar value.
pub type Row = serde_json::Map<String, Value>;

/// Column-oriented tabular input: column name -> column values.
///
/// This is the input shape of incremental loads only; hard resets take
/// row-oriented input. The two shapes are intentionally distinct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnarTable(pub serde_json::Map<String, Value>);

impl ColumnarTable {
    /// Converts column-oriented storage into row-oriented records.
    ///
    /// Every column must be an array and all columns must have the same
    /// length. An empty table yields zero rows.
    pub fn into_rows(self) -> Result<Vec<Row>, DataShapeError> {
        let mut columns = Vec::with_capacity(self.0.len());
        let mut row_count: Option<usize> = None;
        for (name, value) in self.0 {
            let Value::Array(values) = value else {
                return Err(DataShapeError::ColumnNotArray { column: name });
            };
            match row_count {
                None => row_count = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(DataShapeError::RaggedColumns {
                        column: name,
                        expected,
                        actual: values.len(),
                    });
                }
                Some(_) => {}
            }
            columns.push((name, values.into_iter()));
        }

        let row_count = row_count.unwrap_or(0);
        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let mut row = Row::new();
            for (name, values) in columns.iter_mut() {
                // Lengths were checked above, so every iterator still has a value.
                if let Some(value) = values.next() {
                    row.insert(name.clone(), value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovePredicate {
    /// Match every existing row (hard reset).
    All,
    /// Match nothing (incremental load).
    Nothing,
}

/// A paired remove-predicate and insert-rows description of a dataset mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changeset {
    pub remove: RemovePredicate,
    pub insert: Vec<Row>,
}

impl Changeset {
    /// Remove every existing row, then insert `rows` as the full new dataset.
    pub fn hard_reset(rows: Vec<Row>) -> Self {
        Self {
            remove: RemovePredicate::All,
            insert: rows,
        }
    }

    /// Append `rows` without removing anything.
    pub fn incremental(rows: Vec<Row>) -> Self {
        Self {
            remove: RemovePredicate::Nothing,
            insert: rows,
        }
    }
}
