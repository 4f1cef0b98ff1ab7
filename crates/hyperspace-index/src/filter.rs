use base64::Engine;
use dashmap::DashMap;
use hyperspace_core::error::{EngineError, Result};
use hyperspace_core::FilterOp;
use roaring::RoaringTreemap;
use tracing::warn;

/// Per-field, per-value postings: `field -> value -> bitmap of ids`.
///
/// `update` is the only mutating entry point the coordinator calls on
/// upsert; `add` exists for the first-ever write of a field (no prior
/// value to remove).
#[derive(Default)]
pub struct FilterIndex {
    fields: DashMap<String, DashMap<i64, RoaringTreemap>>,
}

impl FilterIndex {
    pub fn new() -> Self {
        FilterIndex::default()
    }

    pub fn add(&self, field: &str, value: i64, id: u64) {
        let postings = self.fields.entry(field.to_string()).or_default();
        postings.entry(value).or_default().insert(id);
    }

    /// Atomically moves `id` from `B[field][old_value]` to
    /// `B[field][new_value]`, pruning an emptied inner bitmap.
    pub fn update(&self, field: &str, old_value: Option<i64>, new_value: i64, id: u64) {
        if let Some(old) = old_value {
            if old == new_value {
                // Nothing moved; still ensure membership (first write of this field/id pair).
                self.add(field, new_value, id);
                return;
            }
            if let Some(postings) = self.fields.get(field) {
                let mut emptied = false;
                if let Some(mut bitmap) = postings.get_mut(&old) {
                    bitmap.remove(id);
                    emptied = bitmap.is_empty();
                }
                if emptied {
                    postings.remove(&old);
                }
            }
        }
        self.add(field, new_value, id);
    }

    /// Removes `id` from every value bucket of `field` it might occupy,
    /// pruning emptied buckets. Used when a record's field disappears
    /// entirely on overwrite (the new payload no longer carries it).
    pub fn remove_all(&self, field: &str, id: u64) {
        if let Some(postings) = self.fields.get(field) {
            let mut to_prune = Vec::new();
            for mut entry in postings.iter_mut() {
                entry.value_mut().remove(id);
                if entry.value().is_empty() {
                    to_prune.push(*entry.key());
                }
            }
            for v in to_prune {
                postings.remove(&v);
            }
        }
    }

    pub fn mask(&self, field: &str, op: FilterOp, value: i64) -> Result<RoaringTreemap> {
        if !op.is_supported() {
            return Err(EngineError::UnsupportedOperator(op));
        }
        let Some(postings) = self.fields.get(field) else {
            return Ok(RoaringTreemap::new());
        };
        match op {
            FilterOp::Eq => Ok(postings
                .get(&value)
                .map(|b| b.clone())
                .unwrap_or_default()),
            FilterOp::Ne => {
                let mut union = RoaringTreemap::new();
                for entry in postings.iter() {
                    if *entry.key() != value {
                        union |= entry.value().clone();
                    }
                }
                Ok(union)
            }
            _ => unreachable!("checked by is_supported above"),
        }
    }

    /// `field|value|base64(bitmap_bytes)` per line, one line per non-empty
    /// `(field, value)` posting.
    pub fn serialize(&self) -> Result<String> {
        let mut out = String::new();
        for field_entry in self.fields.iter() {
            let field = field_entry.key();
            for value_entry in field_entry.value().iter() {
                let mut bytes = Vec::new();
                value_entry
                    .value()
                    .serialize_into(&mut bytes)
                    .map_err(|e| EngineError::Internal(format!("bitmap serialize failed: {e}")))?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                out.push_str(&format!("{field}|{}|{encoded}\n", value_entry.key()));
            }
        }
        Ok(out)
    }

    pub fn deserialize(s: &str) -> Self {
        let index = FilterIndex::new();
        for line in s.lines() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, '|');
            let (Some(field), Some(value_str), Some(encoded)) =
                (parts.next(), parts.next(), parts.next())
            else {
                warn!("skipping malformed filter index line: {line:?}");
                continue;
            };
            let Ok(value) = value_str.parse::<i64>() else {
                warn!("skipping filter index line with non-integer value: {line:?}");
                continue;
            };
            let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
                warn!("skipping filter index line with invalid base64: {line:?}");
                continue;
            };
            let Ok(bitmap) = RoaringTreemap::deserialize_from(&bytes[..]) else {
                warn!("skipping filter index line with invalid bitmap bytes: {line:?}");
                continue;
            };
            index
                .fields
                .entry(field.to_string())
                .or_default()
                .insert(value, bitmap);
        }
        index
    }
}
