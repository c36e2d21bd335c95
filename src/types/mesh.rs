use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Number of UV channels a mesh may carry.
pub const MAX_UV_CHANNELS: usize = 5;

/// The source asset a mesh was loaded from.
///
/// An empty `key` means the mesh has no stable origin and cannot be cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAsset {
    /// Stable key of the originating file (asset GUID).
    pub key: String,
    /// Last-modified time of the originating file, in nanoseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SourceAsset {
    pub fn new(key: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    /// Stamp `key` with the modification time of `path`.
    pub fn from_file(key: impl Into<String>, path: &Path) -> io::Result<Self> {
        let modified = std::fs::metadata(path)?.modified()?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_else(|e| -(e.duration().as_nanos() as i64));
        Ok(Self::new(key, nanos))
    }

    pub fn is_cacheable(&self) -> bool {
        !self.key.is_empty()
    }
}

/// Mesh buffers used during a build pass.
///
/// Attribute arrays are either empty or hold one entry per position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Vec4>,
    /// UV channels 0..4; an empty channel is absent.
    pub uvs: [Vec<Vec2>; MAX_UV_CHANNELS],
    /// Triangle index lists, one per submesh.
    pub submeshes: Vec<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceAsset>,
}

impl WorkingMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.len() / 3).sum()
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    /// Indices of submesh `index`, empty when out of range.
    pub fn triangles(&self, index: usize) -> &[u32] {
        self.submeshes.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// UVs of `channel`, empty when absent or out of range.
    pub fn uv_channel(&self, channel: usize) -> &[Vec2] {
        self.uvs.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_uv_channel(&mut self, channel: usize, uvs: Vec<Vec2>) {
        if let Some(slot) = self.uvs.get_mut(channel) {
            *slot = uvs;
        }
    }

    pub fn has_uv_channel(&self, channel: usize) -> bool {
        !self.uv_channel(channel).is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of distinct vertex positions.
    pub fn unique_vertex_count(&self) -> usize {
        self.positions
            .iter()
            .map(|p| p.to_array().map(f32::to_bits))
            .collect::<HashSet<_>>()
            .len()
    }
}
