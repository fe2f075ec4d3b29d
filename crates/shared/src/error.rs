use thiserror::Error;

/// Failures local to one visualization instance.
///
/// Nothing here is fatal to the process; every variant describes an outcome
/// the affected instance's caller can observe and recover from.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("view construction failed: {reason}")]
    Construction { reason: String },
    #[error("view has no method {method:?} on its capability surface")]
    MethodNotFound { method: String },
    #[error("no view has been created for this instance yet")]
    NotCreated,
    #[error("instance has been torn down")]
    InstanceClosed,
    #[error("view future was abandoned before it resolved")]
    Abandoned,
    #[error(transparent)]
    Data(#[from] DataShapeError),
}

impl ViewError {
    pub fn construction(reason: impl Into<String>) -> Self {
        Self::Construction {
            reason: reason.into(),
        }
    }
}

/// Shape errors in tabular data handed to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataShapeError {
    #[error("column {column:?} is not an array")]
    ColumnNotArray { column: String },
    #[error("column {column:?} has {actual} values, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Rejections of inbound cross-process command messages.
///
/// All of these are raised before any registry lookup happens; a malformed
/// message never reaches a controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("command message is not a JSON object")]
    NotAnObject,
    #[error("command message is missing required field {field:?}")]
    MissingField { field: &'static str },
    #[error("command message field {field:?} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}
