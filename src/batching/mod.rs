//! Texture atlasing and mesh merging for build groups.

pub mod batcher;
pub mod mesh_combiner;
pub mod texture_cache;
pub mod texture_packer;
pub mod uv_remap;

pub use batcher::{BatchReport, SimpleBatcher};
pub use mesh_combiner::{CombineInfo, MeshCombiner};
pub use texture_cache::MaterialTextureCache;
pub use texture_packer::{AtlasId, AtlasRegion, GroupId, MaterialTexture, TextureAtlas, TexturePacker};
pub use uv_remap::{CENTER_UV, RemapStats, remap_uvs};
