use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec4;

use super::texture::{SharedTexture, WorkingTexture};

/// Whether the batcher owns a material or merely references an existing asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialOwnership {
    /// Existing on-disk asset, reused by reference.
    Referenced,
    /// Allocated during the build pass and released with it.
    Owned,
}

/// A material as seen by the batcher: named texture slots and color properties.
#[derive(Debug, Clone)]
pub struct WorkingMaterial {
    /// Stable identity (asset GUID for referenced materials).
    pub id: String,
    pub name: String,
    pub ownership: MaterialOwnership,
    textures: BTreeMap<String, SharedTexture>,
    colors: BTreeMap<String, Vec4>,
}

impl WorkingMaterial {
    /// New material instance owned by the build pass.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ownership: MaterialOwnership::Owned,
            textures: BTreeMap::new(),
            colors: BTreeMap::new(),
        }
    }

    /// Reference to an existing material asset.
    pub fn reference(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ownership: MaterialOwnership::Referenced,
            ..Self::new(id, name)
        }
    }

    pub fn with_texture(mut self, slot: impl Into<String>, texture: WorkingTexture) -> Self {
        self.set_texture(slot, Arc::new(texture));
        self
    }

    pub fn with_color(mut self, property: impl Into<String>, color: Vec4) -> Self {
        self.set_color(property, color);
        self
    }

    pub fn texture(&self, slot: &str) -> Option<&SharedTexture> {
        self.textures.get(slot)
    }

    pub fn set_texture(&mut self, slot: impl Into<String>, texture: SharedTexture) {
        self.textures.insert(slot.into(), texture);
    }

    /// Texture slots in name order.
    pub fn textures(&self) -> impl Iterator<Item = (&str, &SharedTexture)> {
        self.textures.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn color(&self, property: &str) -> Option<Vec4> {
        self.colors.get(property).copied()
    }

    pub fn set_color(&mut self, property: impl Into<String>, color: Vec4) {
        self.colors.insert(property.into(), color);
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == MaterialOwnership::Owned
    }
}
