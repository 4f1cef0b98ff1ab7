use thiserror::Error;

/// The complete error taxonomy surfaced by every fallible operation below the
/// boundary adapter. Nothing lower in the stack uses `anyhow` or a bare
/// `String` error; everything funnels through one of these variants.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("index kind {0:?} was never registered")]
    NotInitialized(crate::IndexKind),

    #[error("ANN index at capacity ({max_elements} elements)")]
    CapacityExceeded { max_elements: usize },

    #[error("filter operator {0:?} is not supported")]
    UnsupportedOperator(crate::FilterOp),

    #[error("WAL corrupt at log_id {log_id}: {reason}")]
    CorruptLog { log_id: u64, reason: String },

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<sled::Error> for EngineError {
    fn from(e: sled::Error) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::BadRequest(format!("malformed json payload: {e}"))
    }
}

/// The wire-agnostic response envelope the boundary adapter downgrades every
/// `EngineError` into. `retcode = 0` is success; any other value is failure
/// and `error_msg` is always populated in that case.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub retcode: i32,
    pub error_msg: Option<String>,
}

impl ErrorEnvelope {
    pub fn ok() -> Self {
        ErrorEnvelope {
            retcode: 0,
            error_msg: None,
        }
    }
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(e: &EngineError) -> Self {
        ErrorEnvelope {
            retcode: 1,
            error_msg: Some(e.to_string()),
        }
    }
}

impl From<EngineError> for ErrorEnvelope {
    fn from(e: EngineError) -> Self {
        ErrorEnvelope::from(&e)
    }
}
