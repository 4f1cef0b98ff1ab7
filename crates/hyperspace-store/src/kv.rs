use hyperspace_core::error::Result;
use std::path::Path;

/// Durable id → record-bytes mapping, backed by an embedded LSM store.
///
/// Two namespaces share one `sled::Db`: numeric ids, encoded as their
/// decimal string (`put`/`get`), and arbitrary string keys used by other
/// components for their own serialized state (`put_raw`/`get_raw`, used by
/// the filter index's postings and by the snapshot high-water mark). The
/// numeric namespace is exactly the set of keys that parse as a plain `u64`;
/// callers of `put_raw`/`get_raw` must avoid keys that look like one.
pub struct ScalarStore {
    db: sled::Db,
}

impl ScalarStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(ScalarStore { db })
    }

    pub fn put(&self, id: u64, record_bytes: &[u8]) -> Result<()> {
        self.db.insert(id.to_string(), record_bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get(&self, id: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(id.to_string())?.map(|v| v.to_vec()))
    }

    pub fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        self.db.insert(key, value.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key)? {
            Some(v) => Ok(Some(
                String::from_utf8(v.to_vec())
                    .map_err(|e| hyperspace_core::EngineError::StorageFailure(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(dir.path()).unwrap();
        store.put(1, b"hello").unwrap();
        assert_eq!(store.get(1).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.get(2).unwrap(), None);
    }

    #[test]
    fn raw_namespace_does_not_collide_with_numeric_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(dir.path()).unwrap();
        store.put(42, b"numeric").unwrap();
        store.put_raw("snapshots_max_log_id", "42").unwrap();
        assert_eq!(store.get(42).unwrap(), Some(b"numeric".to_vec()));
        assert_eq!(
            store.get_raw("snapshots_max_log_id").unwrap(),
            Some("42".to_string())
        );
    }

    #[test]
    fn overwrite_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScalarStore::open(dir.path()).unwrap();
        store.put(1, b"first").unwrap();
        store.put(1, b"second").unwrap();
        assert_eq!(store.get(1).unwrap(), Some(b"second".to_vec()));
    }
}
