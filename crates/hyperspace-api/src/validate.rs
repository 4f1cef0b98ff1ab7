use crate::requests::{SearchRequestWire, UpsertRequest};
use hyperspace_core::error::{EngineError, Result};
use hyperspace_core::{FilterOp, IndexKind};

/// Parses the wire `index_type` string, rejecting anything outside
/// `{"FLAT", "HNSW"}`.
pub fn parse_index_kind(s: &str) -> Result<IndexKind> {
    IndexKind::parse(s).ok_or_else(|| EngineError::BadRequest(format!("unrecognized index_type {s:?}")))
}

/// Parses a wire filter operator. Recognized-but-unimplemented operators
/// (`>`, `<`, `>=`, `<=`) surface `UnsupportedOperator`, not `BadRequest` —
/// the request was well-formed, the engine just can't serve it.
pub fn parse_filter_op(s: &str) -> Result<FilterOp> {
    let op = FilterOp::parse(s).ok_or_else(|| EngineError::BadRequest(format!("unrecognized filter op {s:?}")))?;
    if !op.is_supported() {
        return Err(EngineError::UnsupportedOperator(op));
    }
    Ok(op)
}

/// Checks `id` presence (implicit, `u64` is always present), non-empty
/// vector, and the vector's dimension against the collection's configured
/// `D` before the request is allowed to reach the coordinator.
pub fn validate_upsert(req: &UpsertRequest, dim: usize) -> Result<()> {
    if req.vector.is_empty() {
        return Err(EngineError::BadRequest("vectors must be non-empty".to_string()));
    }
    if req.vector.len() != dim {
        return Err(EngineError::BadRequest(format!(
            "vectors has dimension {} but collection is configured for {dim}",
            req.vector.len()
        )));
    }
    parse_index_kind(&req.index_type)?;
    Ok(())
}

pub fn validate_search(req: &SearchRequestWire, dim: usize) -> Result<()> {
    if req.vector.is_empty() {
        return Err(EngineError::BadRequest("vectors must be non-empty".to_string()));
    }
    if req.vector.len() != dim {
        return Err(EngineError::BadRequest(format!(
            "vectors has dimension {} but collection is configured for {dim}",
            req.vector.len()
        )));
    }
    if req.k < 1 {
        return Err(EngineError::BadRequest("k must be at least 1".to_string()));
    }
    parse_index_kind(&req.index_type)?;
    if let Some(filter) = &req.filter {
        parse_filter_op(&filter.op)?;
    }
    Ok(())
}
