//! Persistent cache of simplification results.

pub mod asset_store;
pub mod simplified_cache;

pub use asset_store::{AssetStore, FileAssetStore, MemoryAssetStore};
pub use simplified_cache::{CACHE_ROOT, RECORD_EXTENSION, SimplifiedCache, SimplifiedMeshEntry, SimplifiedMeshList};
