use hyperspace_core::error::{EngineError, Result};
use hyperspace_core::{EngineConfig, FilterOp, IndexKind, MetricKind, Record};
use hyperspace_index::IndexRegistry;
use hyperspace_store::{ScalarStore, Wal, SNAPSHOT_WATERMARK_KEY};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, instrument, warn};

/// The WAL's actual `upsert` payload: the record plus the index kind it was
/// routed to, so `reload` can dispatch to the same index the original
/// `upsert` call used instead of guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalUpsertPayload {
    record: Record,
    index_kind: IndexKind,
}

/// Fuses the vector indexes, the filter index, the WAL, and the scalar store
/// into the four public operations (`upsert`, `search`, `query`, `snapshot`)
/// plus startup `reload`.
///
/// Outer concurrency discipline: a single `RwLock<()>` gate. `upsert`,
/// `snapshot`, and `reload` take the write guard; `search` and `query` take
/// the read guard. Each component still guards its own state narrowly (the
/// WAL's internal mutex, the registry's own lock, the scalar store's), so a
/// reader blocked on the gate never also contends with unrelated index
/// bookkeeping once past it.
pub struct Database {
    gate: RwLock<()>,
    wal: Wal,
    scalar_store: ScalarStore,
    registry: RwLock<IndexRegistry>,
    config: EngineConfig,
    metric: MetricKind,
    dim: usize,
}

pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub k: usize,
    pub index_kind: IndexKind,
    pub filter: Option<(String, FilterOp, i64)>,
}

impl Database {
    /// Opens (or creates) the data directory at `config.data_dir`, loads the
    /// last snapshot, and replays the WAL tail beyond its watermark.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: EngineConfig, metric: MetricKind, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let scalar_store = ScalarStore::open(config.scalar_dir())?;
        let last_snapshot_id = scalar_store
            .get_raw(SNAPSHOT_WATERMARK_KEY)?
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let wal = Wal::open(config.wal_path(), last_snapshot_id)?;
        let registry = if config.snapshot_dir().exists() {
            IndexRegistry::load_all(config.snapshot_dir(), metric, dim, &scalar_store)?
        } else {
            IndexRegistry::new(metric, dim)
        };

        let db = Database {
            gate: RwLock::new(()),
            wal,
            scalar_store,
            registry: RwLock::new(registry),
            config,
            metric,
            dim,
        };
        db.reload()?;
        Ok(db)
    }

    /// Re-applies every WAL record beyond the snapshot watermark. Called once
    /// at startup; may also be invoked explicitly to recover from an
    /// in-memory-only crash without restarting the process.
    #[instrument(skip(self))]
    pub fn reload(&self) -> Result<()> {
        let _write_guard = self.gate.write();
        self.wal.replay(|op, payload| {
            if op != "upsert" {
                warn!(op, "skipping unrecognized WAL op during replay");
                return Ok(());
            }
            let entry: WalUpsertPayload = serde_json::from_value(payload)?;
            self.apply_upsert(&entry.record, entry.index_kind)
        })?;
        debug!("reload complete");
        Ok(())
    }

    /// Applies a record's effect to the vector index, filter index, and
    /// scalar store, without touching the WAL. Used both by `upsert` (after
    /// the WAL append) and by `reload` (replaying already-durable records).
    fn apply_upsert(&self, record: &Record, index_kind: IndexKind) -> Result<()> {
        if record.vector.len() != self.dim {
            return Err(EngineError::BadRequest(format!(
                "vector has dimension {} but collection is configured for {}",
                record.vector.len(),
                self.dim
            )));
        }
        let previous = self
            .scalar_store
            .get(record.id)?
            .map(|bytes| Record::from_bytes(&bytes))
            .transpose()?;

        let mut registry = self.registry.write();
        registry.init(index_kind, &self.config);

        if previous.is_some() && index_kind == IndexKind::Flat {
            if let Some(flat) = registry.flat_mut() {
                flat.remove(&[record.id]);
            }
        }

        match index_kind {
            IndexKind::Flat => {
                registry
                    .flat_mut()
                    .ok_or(EngineError::NotInitialized(IndexKind::Flat))?
                    .insert(&record.vector, record.id)?;
            }
            IndexKind::Ann => {
                registry
                    .ann_mut()
                    .ok_or(EngineError::NotInitialized(IndexKind::Ann))?
                    .insert(&record.vector, record.id)?;
            }
        }

        let filter = registry.filter();
        let previous_fields: BTreeMap<&str, i64> = previous
            .as_ref()
            .map(|p| p.integer_fields().collect())
            .unwrap_or_default();
        for (field, new_value) in record.integer_fields() {
            let old_value = previous_fields.get(field).copied();
            filter.update(field, old_value, new_value, record.id);
        }
        let dropped_fields: Vec<String> = previous_fields
            .keys()
            .filter(|f| !record.scalars.contains_key(**f))
            .map(|f| (*f).to_string())
            .collect();
        for field in &dropped_fields {
            filter.remove_all(field, record.id);
        }
        drop(registry);

        self.scalar_store.put(record.id, &record.to_bytes()?)?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(id = record.id, index_kind = ?index_kind))]
    pub fn upsert(&self, record: Record, index_kind: IndexKind) -> Result<()> {
        let _write_guard = self.gate.write();
        let entry = WalUpsertPayload { record: record.clone(), index_kind };
        let payload = serde_json::to_value(&entry)?;
        self.wal.append("upsert", &payload)?;
        self.apply_upsert(&record, index_kind)?;
        debug!("upsert applied");
        Ok(())
    }

    #[instrument(skip(self, request), fields(k = request.k, index_kind = ?request.index_kind))]
    pub fn search(&self, request: &SearchRequest) -> Result<(Vec<i64>, Vec<f32>)> {
        let _read_guard = self.gate.read();
        if request.k == 0 {
            return Err(EngineError::BadRequest("k must be at least 1".to_string()));
        }
        if request.vector.len() != self.dim {
            return Err(EngineError::BadRequest(format!(
                "query vector has dimension {} but collection is configured for {}",
                request.vector.len(),
                self.dim
            )));
        }
        let registry = self.registry.read();
        let mask = match &request.filter {
            Some((field, op, value)) => Some(registry.filter().mask(field, *op, *value)?),
            None => None,
        };

        let (ids, dists) = match request.index_kind {
            IndexKind::Flat => {
                let flat = registry
                    .flat()
                    .ok_or(EngineError::NotInitialized(IndexKind::Flat))?;
                flat.search(&request.vector, request.k, mask.as_ref())
            }
            IndexKind::Ann => {
                let ann = registry
                    .ann()
                    .ok_or(EngineError::NotInitialized(IndexKind::Ann))?;
                ann.search(&request.vector, request.k, mask.as_ref(), self.config.get_ef_search())
            }
        };

        let (ids, dists): (Vec<_>, Vec<_>) = ids
            .into_iter()
            .zip(dists)
            .filter(|(id, _)| *id != -1)
            .unzip();
        debug!(hits = ids.len(), "search complete");
        Ok((ids, dists))
    }

    #[instrument(skip(self))]
    pub fn query(&self, id: u64) -> Result<Option<Record>> {
        let _read_guard = self.gate.read();
        match self.scalar_store.get(id)? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Freezes the WAL watermark, persists every index kind, and writes the
    /// new watermark under its sidecar key. No WAL truncation: the watermark
    /// alone governs what a future `reload` replays.
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> Result<()> {
        let _write_guard = self.gate.write();
        let watermark = self.wal.freeze_snapshot_watermark();
        let registry = self.registry.read();
        if let Err(e) = registry.save_all(self.config.snapshot_dir(), &self.scalar_store) {
            error!(error = %e, "snapshot failed");
            return Err(e);
        }
        drop(registry);
        self.scalar_store
            .put_raw(SNAPSHOT_WATERMARK_KEY, &watermark.to_string())?;
        debug!(watermark, "snapshot complete");
        Ok(())
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn open_db(dim: usize) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().to_path_buf());
        let db = Database::open(config, MetricKind::L2, dim).unwrap();
        (dir, db)
    }

    #[test]
    fn upsert_then_query_returns_record() {
        let (_dir, db) = open_db(2);
        let rec = Record::new(1, vec![1.0, 2.0], BTreeMap::new());
        db.upsert(rec.clone(), IndexKind::Flat).unwrap();
        assert_eq!(db.query(1).unwrap(), Some(rec));
    }

    #[test]
    fn upsert_then_search_finds_nearest() {
        let (_dir, db) = open_db(2);
        db.upsert(Record::new(1, vec![0.0, 0.0], BTreeMap::new()), IndexKind::Flat).unwrap();
        db.upsert(Record::new(2, vec![10.0, 10.0], BTreeMap::new()), IndexKind::Flat).unwrap();
        let (ids, _) = db
            .search(&SearchRequest {
                vector: vec![0.0, 0.0],
                k: 1,
                index_kind: IndexKind::Flat,
                filter: None,
            })
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn filter_narrows_search_results() {
        let (_dir, db) = open_db(2);
        let mut a = BTreeMap::new();
        a.insert("color".to_string(), hyperspace_core::Value::Integer(1));
        let mut b = BTreeMap::new();
        b.insert("color".to_string(), hyperspace_core::Value::Integer(2));
        db.upsert(Record::new(10, vec![0.0, 0.0], a), IndexKind::Flat).unwrap();
        db.upsert(Record::new(11, vec![0.0, 0.0], b), IndexKind::Flat).unwrap();
        let (ids, _) = db
            .search(&SearchRequest {
                vector: vec![0.0, 0.0],
                k: 5,
                index_kind: IndexKind::Flat,
                filter: Some(("color".to_string(), FilterOp::Eq, 2)),
            })
            .unwrap();
        assert_eq!(ids, vec![11]);
    }

    #[test]
    fn snapshot_then_reopen_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = EngineConfig::new(dir.path().to_path_buf());
            let db = Database::open(config, MetricKind::L2, 2).unwrap();
            db.upsert(Record::new(1, vec![1.0, 1.0], BTreeMap::new()), IndexKind::Flat).unwrap();
            db.snapshot().unwrap();
        }
        let config = EngineConfig::new(dir.path().to_path_buf());
        let db = Database::open(config, MetricKind::L2, 2).unwrap();
        assert!(db.query(1).unwrap().is_some());
    }

    #[test]
    fn crash_before_snapshot_recovers_via_wal_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = EngineConfig::new(dir.path().to_path_buf());
            let db = Database::open(config, MetricKind::L2, 2).unwrap();
            db.upsert(Record::new(1, vec![1.0, 1.0], BTreeMap::new()), IndexKind::Flat).unwrap();
            // No snapshot taken; simulate a restart from WAL alone.
        }
        let config = EngineConfig::new(dir.path().to_path_buf());
        let db = Database::open(config, MetricKind::L2, 2).unwrap();
        assert!(db.query(1).unwrap().is_some());
        let (ids, _) = db
            .search(&SearchRequest {
                vector: vec![1.0, 1.0],
                k: 1,
                index_kind: IndexKind::Flat,
                filter: None,
            })
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn reload_replays_ann_upserts_into_the_ann_index_not_flat() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = EngineConfig::new(dir.path().to_path_buf());
            let db = Database::open(config, MetricKind::L2, 2).unwrap();
            db.upsert(Record::new(1, vec![1.0, 1.0], BTreeMap::new()), IndexKind::Ann).unwrap();
            // No snapshot: restart must replay from the WAL alone.
        }
        let config = EngineConfig::new(dir.path().to_path_buf());
        let db = Database::open(config, MetricKind::L2, 2).unwrap();
        let (ids, _) = db
            .search(&SearchRequest {
                vector: vec![1.0, 1.0],
                k: 1,
                index_kind: IndexKind::Ann,
                filter: None,
            })
            .unwrap();
        assert_eq!(ids, vec![1]);
        // The flat index was never touched by this record.
        let flat_result = db.search(&SearchRequest {
            vector: vec![1.0, 1.0],
            k: 1,
            index_kind: IndexKind::Flat,
            filter: None,
        });
        assert!(matches!(flat_result, Err(EngineError::NotInitialized(IndexKind::Flat))));
    }

    #[test]
    fn overwrite_updates_filter_posting_and_drops_the_old_one() {
        let (_dir, db) = open_db(2);
        let mut scalars = BTreeMap::new();
        scalars.insert("color".to_string(), hyperspace_core::Value::Integer(1));
        db.upsert(Record::new(1, vec![0.0, 0.0], scalars), IndexKind::Flat).unwrap();
        let mut scalars2 = BTreeMap::new();
        scalars2.insert("color".to_string(), hyperspace_core::Value::Integer(2));
        db.upsert(Record::new(1, vec![0.0, 0.0], scalars2), IndexKind::Flat).unwrap();

        let (old_hits, _) = db
            .search(&SearchRequest {
                vector: vec![0.0, 0.0],
                k: 5,
                index_kind: IndexKind::Flat,
                filter: Some(("color".to_string(), FilterOp::Eq, 1)),
            })
            .unwrap();
        assert!(old_hits.is_empty());
    }
}
