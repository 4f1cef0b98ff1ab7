use crate::requests::{
    QueryRequestWire, QueryResponseWire, SearchRequestWire, SearchResponseWire, SnapshotResponse,
    UpsertRequest, UpsertResponse,
};
use crate::validate::{parse_filter_op, parse_index_kind, validate_search, validate_upsert};
use hyperspace_core::ErrorEnvelope;
use hyperspace_engine::{Database, SearchRequest};
use tracing::error;

/// Validates then delegates to the coordinator, downgrading any
/// [`EngineError`](hyperspace_core::EngineError) to the wire envelope. This
/// is the only place in the crate that talks to [`Database`] directly — it
/// owns no socket and parses no bytes off any wire.
pub fn handle_upsert(db: &Database, req: UpsertRequest) -> UpsertResponse {
    if let Err(e) = validate_upsert(&req, db.dim()) {
        return ErrorEnvelope::from(e).into();
    }
    let index_kind = match parse_index_kind(&req.index_type) {
        Ok(k) => k,
        Err(e) => return ErrorEnvelope::from(e).into(),
    };
    let record = req.into_record();
    match db.upsert(record, index_kind) {
        Ok(()) => UpsertResponse::ok(),
        Err(e) => {
            error!(error = %e, "upsert failed");
            ErrorEnvelope::from(e).into()
        }
    }
}

pub fn handle_search(db: &Database, req: SearchRequestWire) -> SearchResponseWire {
    if let Err(e) = validate_search(&req, db.dim()) {
        return ErrorEnvelope::from(e).into();
    }
    let index_kind = match parse_index_kind(&req.index_type) {
        Ok(k) => k,
        Err(e) => return ErrorEnvelope::from(e).into(),
    };
    let filter = match &req.filter {
        Some(f) => match parse_filter_op(&f.op) {
            Ok(op) => Some((f.field_name.clone(), op, f.value)),
            Err(e) => return ErrorEnvelope::from(e).into(),
        },
        None => None,
    };
    let request = SearchRequest {
        vector: req.vector,
        #[allow(clippy::cast_sign_loss)]
        k: req.k as usize,
        index_kind,
        filter,
    };
    match db.search(&request) {
        Ok((ids, distances)) => SearchResponseWire::ok(ids, distances),
        Err(e) => {
            error!(error = %e, "search failed");
            ErrorEnvelope::from(e).into()
        }
    }
}

pub fn handle_query(db: &Database, req: QueryRequestWire) -> QueryResponseWire {
    match db.query(req.id) {
        Ok(record) => QueryResponseWire::ok(record),
        Err(e) => {
            error!(error = %e, "query failed");
            ErrorEnvelope::from(e).into()
        }
    }
}

pub fn handle_snapshot(db: &Database) -> SnapshotResponse {
    match db.snapshot() {
        Ok(()) => SnapshotResponse::ok(),
        Err(e) => {
            error!(error = %e, "snapshot failed");
            ErrorEnvelope::from(e).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EngineConfig, MetricKind};
    use std::collections::BTreeMap;

    fn open_db(dim: usize) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().to_path_buf());
        let db = Database::open(config, MetricKind::L2, dim).unwrap();
        (dir, db)
    }

    #[test]
    fn upsert_then_query_round_trips_through_the_wire_types() {
        let (_dir, db) = open_db(2);
        let up = handle_upsert(
            &db,
            UpsertRequest {
                id: 1,
                vector: vec![1.0, 2.0],
                index_type: "FLAT".to_string(),
                scalars: BTreeMap::new(),
            },
        );
        assert_eq!(up.retcode, 0);

        let resp = handle_query(&db, QueryRequestWire { id: 1 });
        assert_eq!(resp.retcode, 0);
        assert_eq!(resp.data.unwrap().id, 1);
    }

    #[test]
    fn bad_dimension_surfaces_nonzero_retcode() {
        let (_dir, db) = open_db(2);
        let resp = handle_upsert(
            &db,
            UpsertRequest {
                id: 1,
                vector: vec![1.0],
                index_type: "FLAT".to_string(),
                scalars: BTreeMap::new(),
            },
        );
        assert_ne!(resp.retcode, 0);
        assert!(resp.error_msg.is_some());
    }

    #[test]
    fn snapshot_round_trip() {
        let (_dir, db) = open_db(2);
        let resp = handle_snapshot(&db);
        assert_eq!(resp.retcode, 0);
    }
}
