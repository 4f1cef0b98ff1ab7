use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The canonical record: a primary id, its dense vector, and an open map of
/// scalar fields. This is exactly what the scalar KV store persists (JSON
/// encoded) and exactly what a query returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(rename = "vectors")]
    pub vector: Vec<f32>,
    #[serde(flatten)]
    pub scalars: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: u64, vector: Vec<f32>, scalars: BTreeMap<String, Value>) -> Self {
        Record {
            id,
            vector,
            scalars,
        }
    }

    /// Integer-valued scalar fields only, the subset the filter index tracks.
    pub fn integer_fields(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.scalars
            .iter()
            .filter_map(|(k, v)| v.as_integer().map(|i| (k.as_str(), i)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
