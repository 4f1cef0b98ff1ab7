use crate::filter::FilterIndex;
use crate::flat::FlatIndex;
use crate::hnsw::HnswIndex;
use hyperspace_core::error::Result;
use hyperspace_core::{EngineConfig, IndexKind, MetricKind};
use hyperspace_store::ScalarStore;
use std::fs;
use std::path::Path;

/// Holds at most one instance per index kind. FLAT and ANN are lazily
/// constructed by `init`; FILTER always exists (a collection always tracks
/// scalar postings regardless of which vector index kinds are in use).
pub struct IndexRegistry {
    metric: MetricKind,
    dim: usize,
    flat: Option<FlatIndex>,
    ann: Option<HnswIndex>,
    filter: FilterIndex,
}

impl IndexRegistry {
    pub fn new(metric: MetricKind, dim: usize) -> Self {
        IndexRegistry {
            metric,
            dim,
            flat: None,
            ann: None,
            filter: FilterIndex::new(),
        }
    }

    pub fn init(&mut self, kind: IndexKind, config: &EngineConfig) {
        match kind {
            IndexKind::Flat => {
                self.flat.get_or_insert_with(|| FlatIndex::new(self.metric, self.dim));
            }
            IndexKind::Ann => {
                self.ann.get_or_insert_with(|| {
                    HnswIndex::new(
                        self.metric,
                        self.dim,
                        config.m,
                        config.get_ef_construction(),
                        config.max_elements,
                    )
                });
            }
        }
    }

    pub fn flat(&self) -> Option<&FlatIndex> {
        self.flat.as_ref()
    }

    pub fn flat_mut(&mut self) -> Option<&mut FlatIndex> {
        self.flat.as_mut()
    }

    pub fn ann(&self) -> Option<&HnswIndex> {
        self.ann.as_ref()
    }

    pub fn ann_mut(&mut self) -> Option<&mut HnswIndex> {
        self.ann.as_mut()
    }

    pub fn filter(&self) -> &FilterIndex {
        &self.filter
    }

    fn filter_key(folder: &Path) -> String {
        format!("filter_index::{}", folder.display())
    }

    pub fn save_all(&self, folder: impl AsRef<Path>, scalar_store: &ScalarStore) -> Result<()> {
        let folder = folder.as_ref();
        fs::create_dir_all(folder)?;
        if let Some(flat) = &self.flat {
            flat.save(folder.join(IndexKind::Flat.file_name()))?;
        }
        if let Some(ann) = &self.ann {
            ann.save(folder.join(IndexKind::Ann.file_name()))?;
        }
        let encoded = self.filter.serialize()?;
        scalar_store.put_raw(&Self::filter_key(folder), &encoded)?;
        Ok(())
    }

    pub fn load_all(
        folder: impl AsRef<Path>,
        metric: MetricKind,
        dim: usize,
        scalar_store: &ScalarStore,
    ) -> Result<Self> {
        let folder = folder.as_ref();
        let flat_path = folder.join(IndexKind::Flat.file_name());
        let flat = if flat_path.exists() {
            Some(FlatIndex::load(&flat_path)?)
        } else {
            None
        };
        let ann_path = folder.join(IndexKind::Ann.file_name());
        let ann = if ann_path.exists() {
            Some(HnswIndex::load(&ann_path)?)
        } else {
            None
        };
        let filter = match scalar_store.get_raw(&Self::filter_key(folder))? {
            Some(s) => FilterIndex::deserialize(&s),
            None => FilterIndex::new(),
        };
        Ok(IndexRegistry {
            metric,
            dim,
            flat,
            ann,
            filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_lazy() {
        let mut reg = IndexRegistry::new(MetricKind::L2, 2);
        assert!(reg.flat().is_none());
        let config = EngineConfig::new(std::env::temp_dir());
        reg.init(IndexKind::Flat, &config);
        reg.init(IndexKind::Flat, &config);
        assert!(reg.flat().is_some());
        assert!(reg.ann().is_none());
    }

    #[test]
    fn save_all_then_load_all_round_trips_every_kind() {
        let dir = tempfile::tempdir().unwrap();
        let scalar_dir = dir.path().join("scalar");
        let store = ScalarStore::open(&scalar_dir).unwrap();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let mut reg = IndexRegistry::new(MetricKind::L2, 2);
        reg.init(IndexKind::Flat, &config);
        reg.init(IndexKind::Ann, &config);
        reg.flat_mut().unwrap().insert(&[1.0, 2.0], 1).unwrap();
        reg.ann_mut().unwrap().insert(&[1.0, 2.0], 1).unwrap();
        reg.filter().add("color", 7, 1);

        let folder = dir.path().join("snapshot");
        reg.save_all(&folder, &store).unwrap();

        let loaded = IndexRegistry::load_all(&folder, MetricKind::L2, 2, &store).unwrap();
        assert!(loaded.flat().unwrap().contains(1));
        assert!(loaded.ann().unwrap().contains(1));
        assert!(loaded.filter().mask("color", hyperspace_core::FilterOp::Eq, 7).unwrap().contains(1));
    }
}
