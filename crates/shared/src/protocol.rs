use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{InstanceId, Row},
    error::MessageError,
};

/// Command name that triggers the dataset-reshaping branch in the router.
pub const CHANGE_COMMAND: &str = "change";

/// An addressed, named command arriving from an external process.
///
/// Wire shape: `{ "id": "...", "fn": "...", "params": { ... } }`. The
/// parameter mapping's shape depends on the command name; only `"change"`
/// has a contract of its own (see [`ChangeParams`]), everything else is
/// forwarded generically with the parameter values as positional arguments
/// in wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub id: InstanceId,
    #[serde(rename = "fn")]
    pub name: String,
    pub params: serde_json::Map<String, Value>,
}

impl CommandMessage {
    /// Validates a raw inbound value field by field.
    ///
    /// Missing or mistyped `id`/`fn`/`params` are rejected here, before any
    /// instance lookup.
    pub fn parse(raw: Value) -> Result<Self, MessageError> {
        let Value::Object(mut fields) = raw else {
            return Err(MessageError::NotAnObject);
        };

        let id = match fields.remove("id") {
            None => return Err(MessageError::MissingField { field: "id" }),
            Some(Value::String(id)) => InstanceId(id),
            Some(_) => {
                return Err(MessageError::InvalidField {
                    field: "id",
                    expected: "a string",
                })
            }
        };
        let name = match fields.remove("fn") {
            None => return Err(MessageError::MissingField { field: "fn" }),
            Some(Value::String(name)) => name,
            Some(_) => {
                return Err(MessageError::InvalidField {
                    field: "fn",
                    expected: "a string",
                })
            }
        };
        let params = match fields.remove("params") {
            None => return Err(MessageError::MissingField { field: "params" }),
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(MessageError::InvalidField {
                    field: "params",
                    expected: "an object",
                })
            }
        };

        Ok(Self { id, name, params })
    }

    /// Parameter values in wire order, for the generic invoke path.
    pub fn positional_args(&self) -> Vec<Value> {
        self.params.values().cloned().collect()
    }
}

/// Reshaped parameters of the reserved `"change"` command.
#[derive(Debug, Clone)]
pub struct ChangeParams {
    pub dataset: String,
    pub rows: Vec<Row>,
}

impl ChangeParams {
    pub fn from_params(params: &serde_json::Map<String, Value>) -> Result<Self, MessageError> {
        let dataset = match params.get("name") {
            None => return Err(MessageError::MissingField { field: "name" }),
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(MessageError::InvalidField {
                    field: "name",
                    expected: "a string",
                })
            }
        };
        let rows = match params.get("data") {
            None => return Err(MessageError::MissingField { field: "data" }),
            Some(Value::Array(values)) => {
                let mut rows = Vec::with_capacity(values.len());
                for value in values {
                    let Value::Object(row) = value else {
                        return Err(MessageError::InvalidField {
                            field: "data",
                            expected: "an array of row objects",
                        });
                    };
                    rows.push(row.clone());
                }
                rows
            }
            Some(_) => {
                return Err(MessageError::InvalidField {
                    field: "data",
                    expected: "an array of row objects",
                })
            }
        };
        Ok(Self { dataset, rows })
    }
}
