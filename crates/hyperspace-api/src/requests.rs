use hyperspace_core::{ErrorEnvelope, Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire-level upsert request: `{id, vectors, index_type, ...scalars}`. The
/// flattened scalar map mirrors [`Record`]'s own shape so a validated request
/// converts into one with no remapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpsertRequest {
    pub id: u64,
    #[serde(rename = "vectors")]
    pub vector: Vec<f32>,
    pub index_type: String,
    #[serde(flatten)]
    pub scalars: BTreeMap<String, Value>,
}

impl UpsertRequest {
    pub fn into_record(self) -> Record {
        Record::new(self.id, self.vector, self.scalars)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub retcode: i32,
    pub error_msg: Option<String>,
}

impl UpsertResponse {
    pub fn ok() -> Self {
        let env = ErrorEnvelope::ok();
        UpsertResponse {
            retcode: env.retcode,
            error_msg: env.error_msg,
        }
    }
}

impl From<ErrorEnvelope> for UpsertResponse {
    fn from(env: ErrorEnvelope) -> Self {
        UpsertResponse {
            retcode: env.retcode,
            error_msg: env.error_msg,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterWire {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    pub op: String,
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchRequestWire {
    #[serde(rename = "vectors")]
    pub vector: Vec<f32>,
    pub k: i64,
    pub index_type: String,
    pub filter: Option<FilterWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponseWire {
    pub retcode: i32,
    #[serde(rename = "vectors")]
    pub ids: Vec<i64>,
    pub distances: Vec<f32>,
    pub error_msg: Option<String>,
}

impl SearchResponseWire {
    pub fn ok(ids: Vec<i64>, distances: Vec<f32>) -> Self {
        SearchResponseWire {
            retcode: 0,
            ids,
            distances,
            error_msg: None,
        }
    }
}

impl From<ErrorEnvelope> for SearchResponseWire {
    fn from(env: ErrorEnvelope) -> Self {
        SearchResponseWire {
            retcode: env.retcode,
            ids: Vec::new(),
            distances: Vec::new(),
            error_msg: env.error_msg,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequestWire {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponseWire {
    pub retcode: i32,
    pub data: Option<Record>,
    pub error_msg: Option<String>,
}

impl QueryResponseWire {
    pub fn ok(data: Option<Record>) -> Self {
        QueryResponseWire {
            retcode: 0,
            data,
            error_msg: None,
        }
    }
}

impl From<ErrorEnvelope> for QueryResponseWire {
    fn from(env: ErrorEnvelope) -> Self {
        QueryResponseWire {
            retcode: env.retcode,
            data: None,
            error_msg: env.error_msg,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub retcode: i32,
    pub error_msg: Option<String>,
}

impl SnapshotResponse {
    pub fn ok() -> Self {
        SnapshotResponse {
            retcode: 0,
            error_msg: None,
        }
    }
}

impl From<ErrorEnvelope> for SnapshotResponse {
    fn from(env: ErrorEnvelope) -> Self {
        SnapshotResponse {
            retcode: env.retcode,
            error_msg: env.error_msg,
        }
    }
}
