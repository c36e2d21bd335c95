use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{SourceAsset, WorkingMesh};

use super::asset_store::AssetStore;

/// Key prefix under which simplification records are stored.
pub const CACHE_ROOT: &str = "cache/simplified/";

/// Extension of a simplification record key.
pub const RECORD_EXTENSION: &str = "meshlist";

/// One cached simplification of a source mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedMeshEntry {
    pub quality: f32,
    /// Identity of the simplifier that produced `mesh`.
    pub algorithm: String,
    pub mesh: WorkingMesh,
}

/// Every cached simplification of one source mesh, valid for one source timestamp.
///
/// Holds at most one entry per `(quality, algorithm)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedMeshList {
    pub source_key: String,
    pub timestamp: i64,
    pub entries: Vec<SimplifiedMeshEntry>,
}

impl SimplifiedMeshList {
    pub fn new(source: &SourceAsset) -> Self {
        Self {
            source_key: source.key.clone(),
            timestamp: source.timestamp,
            entries: Vec::new(),
        }
    }

    pub fn find(&self, quality: f32, algorithm: &str) -> Option<&SimplifiedMeshEntry> {
        self.entries
            .iter()
            .find(|e| e.quality == quality && e.algorithm == algorithm)
    }

    /// Replace the mesh of the matching entry, or append a new one.
    pub fn upsert(&mut self, quality: f32, algorithm: &str, mesh: WorkingMesh) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.quality == quality && e.algorithm == algorithm)
        {
            Some(entry) => entry.mesh = mesh,
            None => self.entries.push(SimplifiedMeshEntry {
                quality,
                algorithm: algorithm.to_string(),
                mesh,
            }),
        }
    }
}

/// Simplification results keyed by source identity, quality and algorithm.
///
/// A record whose timestamp no longer matches its source is discarded as a
/// whole and replaced by an empty one.
pub struct SimplifiedCache<S> {
    store: S,
}

impl<S: AssetStore> SimplifiedCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Store key of the record for `source_key`.
    pub fn record_key(source_key: &str) -> String {
        format!("{CACHE_ROOT}{source_key}.{RECORD_EXTENSION}")
    }

    /// Cached simplification of `source`, if one was stored for this
    /// `quality` and `algorithm` since the source last changed.
    ///
    /// Meshes without a cacheable source, and non-finite qualities, never hit.
    pub fn get(&mut self, algorithm: &str, source: &WorkingMesh, quality: f32) -> Result<Option<WorkingMesh>> {
        let Some(asset) = cacheable(source) else {
            return Ok(None);
        };
        if !quality.is_finite() {
            debug!(source = %asset.key, quality, "Quality is not finite, skipping cache lookup");
            return Ok(None);
        }

        let record = self.resolve_record(asset)?;
        let hit = record.find(quality, algorithm).map(|e| e.mesh.clone());
        debug!(
            source = %asset.key,
            algorithm,
            quality,
            hit = hit.is_some(),
            "Simplification cache lookup"
        );
        Ok(hit)
    }

    /// Store `simplified` as the result of `algorithm` at `quality` for `source`.
    pub fn update(&mut self, algorithm: &str, source: &WorkingMesh, simplified: &WorkingMesh, quality: f32) -> Result<()> {
        let Some(asset) = cacheable(source) else {
            debug!(mesh = %source.name, "Mesh has no source asset, not caching");
            return Ok(());
        };
        // JSON has no representation for NaN or infinity
        if !quality.is_finite() {
            warn!(source = %asset.key, quality, "Quality is not finite, not caching");
            return Ok(());
        }

        let mut record = self.resolve_record(asset)?;
        record.upsert(quality, algorithm, simplified.clone());
        self.save_record(&record)?;
        debug!(source = %asset.key, algorithm, quality, entries = record.entries.len(), "Simplification cached");
        Ok(())
    }

    /// Remove every simplification record.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.store.delete_prefix(CACHE_ROOT)?;
        info!(removed, "Simplification cache cleared");
        Ok(removed)
    }

    /// Load the record for `asset`, recreating it when absent, corrupt or stale.
    fn resolve_record(&mut self, asset: &SourceAsset) -> Result<SimplifiedMeshList> {
        let key = Self::record_key(&asset.key);

        let loaded = match self.store.load(&key)? {
            Some(bytes) => match serde_json::from_slice::<SimplifiedMeshList>(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable cache record");
                    None
                }
            },
            None => None,
        };

        match loaded {
            Some(record) if record.timestamp == asset.timestamp => Ok(record),
            stale => {
                if let Some(old) = stale {
                    debug!(
                        key = %key,
                        cached = old.timestamp,
                        current = asset.timestamp,
                        "Source changed, invalidating cache record"
                    );
                }
                self.store.delete(&key)?;
                let record = SimplifiedMeshList::new(asset);
                self.save_record(&record)?;
                Ok(record)
            }
        }
    }

    fn save_record(&mut self, record: &SimplifiedMeshList) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.save(&Self::record_key(&record.source_key), &bytes)
    }
}

fn cacheable(mesh: &WorkingMesh) -> Option<&SourceAsset> {
    mesh.source.as_ref().filter(|s| s.is_cacheable())
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::cache::MemoryAssetStore;

    fn source_mesh(key: &str, timestamp: i64) -> WorkingMesh {
        WorkingMesh {
            name: "rock".into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            submeshes: vec![vec![0, 1, 2, 1, 3, 2]],
            source: Some(SourceAsset::new(key, timestamp)),
            ..Default::default()
        }
    }

    fn reduced(name: &str) -> WorkingMesh {
        WorkingMesh {
            name: name.into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            submeshes: vec![vec![0, 1, 2]],
            ..Default::default()
        }
    }

    fn load_record(cache: &SimplifiedCache<MemoryAssetStore>, key: &str) -> SimplifiedMeshList {
        let bytes = cache
            .store()
            .load(&SimplifiedCache::<MemoryAssetStore>::record_key(key))
            .unwrap()
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn record_key_layout() {
        assert_eq!(
            SimplifiedCache::<MemoryAssetStore>::record_key("abc123"),
            "cache/simplified/abc123.meshlist"
        );
    }

    #[test]
    fn update_then_get_roundtrip() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let source = source_mesh("guid-rock", 100);
        let simplified = reduced("rock_lod1");

        cache.update("meshopt", &source, &simplified, 0.5).unwrap();
        assert_eq!(cache.get("meshopt", &source, 0.5).unwrap(), Some(simplified));
    }

    #[test]
    fn different_quality_or_algorithm_misses() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let source = source_mesh("guid-rock", 100);
        cache.update("meshopt", &source, &reduced("lod"), 0.5).unwrap();

        assert!(cache.get("meshopt", &source, 0.25).unwrap().is_none());
        assert!(cache.get("quadric", &source, 0.5).unwrap().is_none());
        assert!(cache.get("meshopt", &source, 0.5).unwrap().is_some());
    }

    #[test]
    fn update_overwrites_matching_entry() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let source = source_mesh("guid-rock", 100);
        cache.update("meshopt", &source, &reduced("first"), 0.5).unwrap();
        cache.update("meshopt", &source, &reduced("second"), 0.5).unwrap();
        cache.update("meshopt", &source, &reduced("other"), 0.75).unwrap();

        let record = load_record(&cache, "guid-rock");
        assert_eq!(record.entries.len(), 2);
        assert_eq!(cache.get("meshopt", &source, 0.5).unwrap().unwrap().name, "second");
    }

    #[test]
    fn timestamp_change_invalidates_whole_record() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let old = source_mesh("guid-rock", 100);
        cache.update("meshopt", &old, &reduced("a"), 0.5).unwrap();
        cache.update("meshopt", &old, &reduced("b"), 0.25).unwrap();

        let changed = source_mesh("guid-rock", 200);
        assert!(cache.get("meshopt", &changed, 0.5).unwrap().is_none());

        cache.update("meshopt", &changed, &reduced("c"), 0.5).unwrap();
        let record = load_record(&cache, "guid-rock");
        assert_eq!(record.timestamp, 200);
        assert_eq!(record.entries.len(), 1);
        assert!(cache.get("meshopt", &changed, 0.25).unwrap().is_none());
    }

    #[test]
    fn miss_persists_fresh_record() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let source = source_mesh("guid-new", 7);
        assert!(cache.get("meshopt", &source, 1.0).unwrap().is_none());

        let record = load_record(&cache, "guid-new");
        assert_eq!(record.timestamp, 7);
        assert!(record.entries.is_empty());
    }

    #[test]
    fn meshes_without_source_are_never_cached() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let mut source = source_mesh("", 1);
        cache.update("meshopt", &source, &reduced("x"), 0.5).unwrap();
        assert!(cache.get("meshopt", &source, 0.5).unwrap().is_none());

        source.source = None;
        cache.update("meshopt", &source, &reduced("x"), 0.5).unwrap();
        assert!(cache.store().is_empty());
    }

    #[test]
    fn non_finite_quality_is_never_stored() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let source = source_mesh("guid-rock", 100);
        cache.update("meshopt", &source, &reduced("kept"), 0.5).unwrap();

        for quality in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            cache.update("meshopt", &source, &reduced("bad"), quality).unwrap();
            assert!(cache.get("meshopt", &source, quality).unwrap().is_none());
        }

        // The record still parses and keeps its entry
        let record = load_record(&cache, "guid-rock");
        assert_eq!(record.entries.len(), 1);
        assert_eq!(cache.get("meshopt", &source, 0.5).unwrap().unwrap().name, "kept");
    }

    #[test]
    fn corrupt_record_is_replaced() {
        let mut store = MemoryAssetStore::new();
        let key = SimplifiedCache::<MemoryAssetStore>::record_key("guid-rock");
        store.save(&key, b"{ not json").unwrap();

        let mut cache = SimplifiedCache::new(store);
        let source = source_mesh("guid-rock", 100);
        assert!(cache.get("meshopt", &source, 0.5).unwrap().is_none());

        cache.update("meshopt", &source, &reduced("ok"), 0.5).unwrap();
        assert!(cache.get("meshopt", &source, 0.5).unwrap().is_some());
    }

    #[test]
    fn unrelated_sources_are_untouched() {
        let mut cache = SimplifiedCache::new(MemoryAssetStore::new());
        let rock = source_mesh("guid-rock", 100);
        let tree = source_mesh("guid-tree", 100);
        cache.update("meshopt", &rock, &reduced("rock"), 0.5).unwrap();
        cache.update("meshopt", &tree, &reduced("tree"), 0.5).unwrap();

        let tree_changed = source_mesh("guid-tree", 101);
        assert!(cache.get("meshopt", &tree_changed, 0.5).unwrap().is_none());
        assert_eq!(cache.get("meshopt", &rock, 0.5).unwrap().unwrap().name, "rock");
    }

    #[test]
    fn clear_removes_every_record() {
        let mut store = MemoryAssetStore::new();
        store.save("unrelated/key", b"keep").unwrap();
        let mut cache = SimplifiedCache::new(store);
        cache.update("meshopt", &source_mesh("a", 1), &reduced("a"), 0.5).unwrap();
        cache.update("meshopt", &source_mesh("b", 1), &reduced("b"), 0.5).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        let store = cache.into_inner();
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["unrelated/key"]);
    }
}
