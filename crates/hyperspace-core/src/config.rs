use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Engine-wide tunables that are not part of any individual request.
///
/// `ef_search` and `ef_construction` are held in atomics so they can be
/// adjusted on a live engine without taking the coordinator's write gate,
/// mirroring the teacher's `GlobalConfig`. `m` and `max_elements` are frozen
/// at ANN-index construction time and are plain fields.
#[derive(Debug)]
pub struct EngineConfig {
    pub ef_search: AtomicUsize,
    pub ef_construction: AtomicUsize,
    pub m: usize,
    pub max_elements: usize,
    pub data_dir: PathBuf,
}

const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_EF_SEARCH: usize = 50;
const DEFAULT_M: usize = 16;
const DEFAULT_MAX_ELEMENTS: usize = 1_000_000;

impl EngineConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        EngineConfig {
            ef_search: AtomicUsize::new(DEFAULT_EF_SEARCH),
            ef_construction: AtomicUsize::new(DEFAULT_EF_CONSTRUCTION),
            m: DEFAULT_M,
            max_elements: DEFAULT_MAX_ELEMENTS,
            data_dir,
        }
    }

    /// Builds configuration from defaults overridden by environment
    /// variables, the same layering the teacher's server bootstrap uses for
    /// its HNSW tunables (`HS_HNSW_EF_CONSTRUCT`, `HS_HNSW_EF_SEARCH`,
    /// `HS_HNSW_M`).
    pub fn from_env(data_dir: PathBuf) -> Self {
        let mut cfg = Self::new(data_dir);
        if let Some(v) = env_usize("HS_HNSW_EF_CONSTRUCT") {
            cfg.ef_construction = AtomicUsize::new(v);
        }
        if let Some(v) = env_usize("HS_HNSW_EF_SEARCH") {
            cfg.ef_search = AtomicUsize::new(v);
        }
        if let Some(v) = env_usize("HS_HNSW_M") {
            cfg.m = v;
        }
        if let Some(v) = env_usize("HS_HNSW_MAX_ELEMENTS") {
            cfg.max_elements = v;
        }
        cfg
    }

    pub fn get_ef_search(&self) -> usize {
        self.ef_search.load(Ordering::Relaxed)
    }

    pub fn set_ef_search(&self, val: usize) {
        self.ef_search.store(val, Ordering::Relaxed);
    }

    pub fn get_ef_construction(&self) -> usize {
        self.ef_construction.load(Ordering::Relaxed)
    }

    pub fn set_ef_construction(&self, val: usize) {
        self.ef_construction.store(val, Ordering::Relaxed);
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshot")
    }

    pub fn scalar_dir(&self) -> PathBuf {
        self.data_dir.join("scalar")
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::new(PathBuf::from("/tmp/x"));
        assert_eq!(cfg.get_ef_construction(), DEFAULT_EF_CONSTRUCTION);
        assert_eq!(cfg.get_ef_search(), DEFAULT_EF_SEARCH);
        assert_eq!(cfg.m, DEFAULT_M);
        assert_eq!(cfg.max_elements, DEFAULT_MAX_ELEMENTS);
    }

    #[test]
    fn derived_paths_are_scoped_under_data_dir() {
        let cfg = EngineConfig::new(PathBuf::from("/tmp/x"));
        assert_eq!(cfg.wal_path(), PathBuf::from("/tmp/x/wal.log"));
        assert_eq!(cfg.snapshot_dir(), PathBuf::from("/tmp/x/snapshot"));
        assert_eq!(cfg.scalar_dir(), PathBuf::from("/tmp/x/scalar"));
    }
}
