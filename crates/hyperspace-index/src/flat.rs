use hyperspace_core::error::{EngineError, Result};
use hyperspace_core::metric::MetricKind;
use roaring::{RoaringBitmap, RoaringTreemap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Exact brute-force top-k over a growing, append-only vector set.
///
/// Slots are append-only; `remove` tombstones a slot rather than
/// compacting the backing `Vec`, so existing slot numbers never shift.
pub struct FlatIndex {
    metric: MetricKind,
    dim: usize,
    vectors: Vec<Vec<f32>>,
    slot_of: HashMap<u64, u32>,
    id_of: HashMap<u32, u64>,
    removed: RoaringBitmap,
}

impl FlatIndex {
    pub fn new(metric: MetricKind, dim: usize) -> Self {
        FlatIndex {
            metric,
            dim,
            vectors: Vec::new(),
            slot_of: HashMap::new(),
            id_of: HashMap::new(),
            removed: RoaringBitmap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slot_of.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.slot_of.len()
    }

    /// Appends `vector` as a new slot labelled `id`. The caller must ensure
    /// `id` is not already present (the coordinator removes before
    /// re-inserting on overwrite).
    pub fn insert(&mut self, vector: &[f32], id: u64) -> Result<()> {
        if vector.len() != self.dim {
            return Err(EngineError::BadRequest(format!(
                "vector has dimension {} but collection is configured for {}",
                vector.len(),
                self.dim
            )));
        }
        if self.slot_of.contains_key(&id) {
            return Err(EngineError::Internal(format!(
                "flat index already holds a live slot for id {id}; caller must remove first"
            )));
        }
        self.vectors.push(vector.to_vec());
        let slot = u32::try_from(self.vectors.len() - 1)
            .map_err(|_| EngineError::CapacityExceeded { max_elements: u32::MAX as usize })?;
        self.slot_of.insert(id, slot);
        self.id_of.insert(slot, id);
        Ok(())
    }

    /// Drops `id` from both direction maps and tombstones its slot. Ids not
    /// present are silently ignored.
    pub fn remove(&mut self, ids: &[u64]) {
        for &id in ids {
            if let Some(slot) = self.slot_of.remove(&id) {
                self.id_of.remove(&slot);
                self.removed.insert(slot);
            }
        }
    }

    /// Returns `(ids, distances)`, both length `k`, padded with `(-1, 0.0)`
    /// when fewer than `k` results survive. Without a mask the result is the
    /// true k-nearest; with a mask, the search draws from the best `2k` raw
    /// candidates and filters — best-effort, not exact.
    pub fn search(&self, query: &[f32], k: usize, mask: Option<&RoaringTreemap>) -> (Vec<i64>, Vec<f32>) {
        let mut candidates: Vec<(u32, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| {
                let slot = slot as u32;
                if self.removed.contains(slot) {
                    None
                } else {
                    Some((slot, self.metric.distance(query, v)))
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            if self.metric.better(a.1, b.1) {
                std::cmp::Ordering::Less
            } else if self.metric.better(b.1, a.1) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });

        let pool: &[(u32, f32)] = if mask.is_some() {
            let limit = (2 * k).min(candidates.len());
            &candidates[..limit]
        } else {
            &candidates[..]
        };

        let mut ids = Vec::with_capacity(k);
        let mut dists = Vec::with_capacity(k);
        for &(slot, dist) in pool {
            if ids.len() == k {
                break;
            }
            let id = self.id_of[&slot];
            if let Some(mask) = mask {
                if !mask.contains(id) {
                    continue;
                }
            }
            ids.push(id as i64);
            dists.push(dist);
        }
        while ids.len() < k {
            ids.push(-1);
            dists.push(0.0);
        }
        (ids, dists)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut removed_bytes = Vec::new();
        self.removed
            .serialize_into(&mut removed_bytes)
            .map_err(|e| EngineError::Internal(format!("bitmap serialize failed: {e}")))?;
        let snapshot = FlatSnapshot {
            metric: self.metric,
            dim: self.dim,
            vectors: self.vectors.clone(),
            slot_of: self.slot_of.iter().map(|(&k, &v)| (k, v)).collect(),
            id_of: self.id_of.iter().map(|(&k, &v)| (k, v)).collect(),
            removed_bytes,
        };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| EngineError::Internal(format!("flat index encode failed: {e}")))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        let snapshot: FlatSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| EngineError::Internal(format!("flat index decode failed: {e}")))?;
        let removed = RoaringBitmap::deserialize_from(&snapshot.removed_bytes[..])
            .map_err(|e| EngineError::Internal(format!("bitmap deserialize failed: {e}")))?;
        Ok(FlatIndex {
            metric: snapshot.metric,
            dim: snapshot.dim,
            vectors: snapshot.vectors,
            slot_of: snapshot.slot_of.into_iter().collect(),
            id_of: snapshot.id_of.into_iter().collect(),
            removed,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct FlatSnapshot {
    metric: MetricKind,
    dim: usize,
    vectors: Vec<Vec<f32>>,
    slot_of: Vec<(u64, u32)>,
    id_of: Vec<(u32, u64)>,
    removed_bytes: Vec<u8>,
}
