use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec4;
use tracing::{debug, warn};

use crate::config::{BatcherConfig, ChannelDescriptor, PackingType};
use crate::types::{BuildGroup, SharedTexture, WorkingMaterial, WorkingTexture};

use super::texture_packer::MaterialTexture;

/// Edge length of the default filler textures.
const DEFAULT_TEXTURE_SIZE: u32 = 4;

/// Per-pass cache of the channel textures of every material.
///
/// Bundles are extracted once per material identity and reused for the rest
/// of the batch. Build a fresh cache for every batch invocation.
pub struct MaterialTextureCache {
    channels: Vec<ChannelDescriptor>,
    enable_tint: bool,
    tint_name: String,
    defaults: HashMap<PackingType, SharedTexture>,
    cache: HashMap<String, MaterialTexture>,
}

impl MaterialTextureCache {
    pub fn new(config: &BatcherConfig) -> Self {
        Self {
            channels: config.channels.clone(),
            enable_tint: config.enable_tint_color,
            tint_name: config.tint_color_name.clone(),
            defaults: create_default_textures(),
            cache: HashMap::new(),
        }
    }

    /// Filler used when a material has no texture for a channel.
    pub fn default_texture(&self, packing: PackingType) -> &SharedTexture {
        &self.defaults[&packing]
    }

    /// Channel bundle of `material`, extracted on first use.
    ///
    /// The material's main input slot is pointed at the bundle's main
    /// texture so later UV lookups resolve the same atlas region.
    pub fn get_material_textures(&mut self, material: &mut WorkingMaterial) -> &MaterialTexture {
        if !self.cache.contains_key(&material.id) {
            let bundle = self.extract(material);
            debug!(material = %material.name, main = bundle.name(), "Cached material textures");
            self.cache.insert(material.id.clone(), bundle);
        }

        let bundle = &self.cache[&material.id];
        material.set_texture(self.channels[0].input_name.clone(), Arc::clone(&bundle[0]));
        bundle
    }

    /// Distinct bundles used by every material of `group`, in first-use order.
    ///
    /// Bundles count as duplicates when both main-texture identity and name match.
    pub fn collect_group_textures(&mut self, group: &mut BuildGroup) -> Vec<MaterialTexture> {
        let mut unique: Vec<MaterialTexture> = Vec::new();
        for object in &mut group.objects {
            for material in &mut object.materials {
                let bundle = self.get_material_textures(material);
                if unique.iter().any(|u| u.same_content(bundle)) {
                    continue;
                }
                unique.push(bundle.clone());
            }
        }
        unique
    }

    /// Number of materials cached so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn extract(&self, material: &WorkingMaterial) -> MaterialTexture {
        let mut bundle = MaterialTexture::default();

        for (i, channel) in self.channels.iter().enumerate() {
            let texture = material
                .texture(&channel.input_name)
                .cloned()
                .unwrap_or_else(|| Arc::clone(self.default_texture(channel.packing)));

            if i == 0 && self.enable_tint {
                bundle.push(Arc::new(self.tinted(material, &texture)));
            } else {
                bundle.push(texture);
            }
        }

        bundle
    }

    /// Copy of `texture` multiplied by the material's tint color.
    fn tinted(&self, material: &WorkingMaterial, texture: &WorkingTexture) -> WorkingTexture {
        let tint = material.color(&self.tint_name).unwrap_or_else(|| {
            warn!(
                material = %material.name,
                property = %self.tint_name,
                "Tint property missing, using white"
            );
            Vec4::ONE
        });

        let mut copy = texture.clone();
        copy.apply_tint(tint);
        copy.name = tinted_name(&texture.name, tint);
        copy
    }
}

/// Name of a tinted texture; distinct tints of one source stay distinct in the atlas.
fn tinted_name(name: &str, tint: Vec4) -> String {
    let c = (tint.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    format!(
        "{name}_tint_{:02x}{:02x}{:02x}{:02x}",
        c.x as u8, c.y as u8, c.z as u8, c.w as u8
    )
}

fn create_default_textures() -> HashMap<PackingType, SharedTexture> {
    let size = DEFAULT_TEXTURE_SIZE;
    HashMap::from([
        (
            PackingType::White,
            Arc::new(WorkingTexture::solid("DefaultWhite", size, size, Vec4::ONE, false)),
        ),
        (
            PackingType::Black,
            Arc::new(WorkingTexture::solid("DefaultBlack", size, size, Vec4::new(0.0, 0.0, 0.0, 1.0), false)),
        ),
        (
            PackingType::Normal,
            Arc::new(WorkingTexture::solid("DefaultNormal", size, size, Vec4::new(0.5, 0.5, 1.0, 1.0), true)),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use glam::Mat4;
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::types::{TextureId, WorkingMesh, WorkingObject};

    fn two_channel_config() -> BatcherConfig {
        BatcherConfig {
            channels: vec![
                ChannelDescriptor::new("_MainTex", "_MainTex", PackingType::White),
                ChannelDescriptor::new("_BumpMap", "_BumpMap", PackingType::Normal),
            ],
            ..Default::default()
        }
    }

    fn textured(id: &str, texture_name: &str, guid: &str, rgba: [u8; 4]) -> WorkingMaterial {
        WorkingMaterial::new(id, id).with_texture(
            "_MainTex",
            WorkingTexture::from_image(texture_name, TextureId::new(guid), RgbaImage::from_pixel(8, 8, Rgba(rgba))),
        )
    }

    #[test]
    fn default_textures_by_packing_type() {
        let cache = MaterialTextureCache::new(&BatcherConfig::default());

        let white = cache.default_texture(PackingType::White);
        assert_eq!(white.pixels.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert!(white.id.is_empty());

        let black = cache.default_texture(PackingType::Black);
        assert_eq!(black.pixels.get_pixel(3, 3).0, [0, 0, 0, 255]);

        let normal = cache.default_texture(PackingType::Normal);
        assert_eq!(normal.pixels.get_pixel(1, 2).0, [128, 128, 255, 255]);
        assert!(normal.linear);
        assert_eq!(normal.dimensions(), (4, 4));
    }

    #[test]
    fn missing_channels_fall_back_to_defaults() {
        let mut cache = MaterialTextureCache::new(&two_channel_config());
        let mut mat = WorkingMaterial::new("bare", "Bare");

        let bundle = cache.get_material_textures(&mut mat).clone();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle[0].name, "DefaultWhite");
        assert_eq!(bundle[1].name, "DefaultNormal");
        assert!(Arc::ptr_eq(&bundle[1], cache.default_texture(PackingType::Normal)));
    }

    #[test]
    fn bundles_are_memoized_by_material_identity() {
        let mut cache = MaterialTextureCache::new(&BatcherConfig::default());
        let mut first = textured("m-1", "brick", "g-brick", [10, 20, 30, 255]);
        let mut again = first.clone();

        let a = Arc::clone(&cache.get_material_textures(&mut first)[0]);
        let b = Arc::clone(&cache.get_material_textures(&mut again)[0]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn main_slot_points_at_cached_texture() {
        let config = BatcherConfig {
            enable_tint_color: true,
            tint_color_name: "_Color".into(),
            ..Default::default()
        };
        let mut cache = MaterialTextureCache::new(&config);
        let mut mat = textured("m-2", "stone", "g-stone", [200, 200, 200, 255])
            .with_color("_Color", Vec4::new(0.5, 0.5, 0.5, 1.0));

        let main = Arc::clone(&cache.get_material_textures(&mut mat)[0]);
        assert!(Arc::ptr_eq(mat.texture("_MainTex").unwrap(), &main));
        assert_eq!(main.name, "stone_tint_808080ff");
        assert_eq!(main.id, TextureId::new("g-stone"));
    }

    #[test]
    fn tint_is_baked_into_a_copy() {
        let config = BatcherConfig {
            enable_tint_color: true,
            tint_color_name: "_Color".into(),
            ..Default::default()
        };
        let mut cache = MaterialTextureCache::new(&config);
        let mut mat = textured("m-3", "stone", "g-stone", [200, 200, 200, 255])
            .with_color("_Color", Vec4::new(0.5, 0.5, 0.5, 1.0));
        let source = Arc::clone(mat.texture("_MainTex").unwrap());

        let main = Arc::clone(&cache.get_material_textures(&mut mat)[0]);
        for p in main.pixels.pixels() {
            for c in 0..3 {
                assert!((p[c] as i32 - 100).abs() <= 1, "channel {c} = {}", p[c]);
            }
            assert_eq!(p[3], 255);
        }
        // Source pixels are untouched
        assert_eq!(source.pixels.get_pixel(0, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn tint_never_touches_shared_defaults() {
        let config = BatcherConfig {
            enable_tint_color: true,
            tint_color_name: "_Color".into(),
            ..Default::default()
        };
        let mut cache = MaterialTextureCache::new(&config);
        let mut mat = WorkingMaterial::new("m-4", "Red").with_color("_Color", Vec4::new(1.0, 0.0, 0.0, 1.0));

        let main = Arc::clone(&cache.get_material_textures(&mut mat)[0]);
        assert_eq!(main.pixels.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert!(main.id.is_empty());
        assert_eq!(
            cache.default_texture(PackingType::White).pixels.get_pixel(0, 0).0,
            [255, 255, 255, 255]
        );
    }

    #[test]
    fn missing_tint_property_is_white() {
        let config = BatcherConfig {
            enable_tint_color: true,
            tint_color_name: "_Color".into(),
            ..Default::default()
        };
        let mut cache = MaterialTextureCache::new(&config);
        let mut mat = textured("m-5", "sand", "g-sand", [40, 80, 120, 255]);

        let main = Arc::clone(&cache.get_material_textures(&mut mat)[0]);
        assert_eq!(main.pixels.get_pixel(0, 0).0, [40, 80, 120, 255]);
    }

    #[test]
    fn group_textures_are_deduplicated() {
        let mut cache = MaterialTextureCache::new(&BatcherConfig::default());
        let shared = textured("m-shared", "wall", "g-wall", [255; 4]);
        let objects = vec![
            WorkingObject::new("a", WorkingMesh::default(), vec![shared.clone()], Mat4::IDENTITY),
            WorkingObject::new("b", WorkingMesh::default(), vec![shared], Mat4::IDENTITY),
            // Same texture asset referenced by a second material
            WorkingObject::new(
                "c",
                WorkingMesh::default(),
                vec![textured("m-other", "wall", "g-wall", [255; 4])],
                Mat4::IDENTITY,
            ),
            // Two untextured materials share the white filler
            WorkingObject::new("d", WorkingMesh::default(), vec![WorkingMaterial::new("m-d", "D")], Mat4::IDENTITY),
            WorkingObject::new("e", WorkingMesh::default(), vec![WorkingMaterial::new("m-e", "E")], Mat4::IDENTITY),
            // Same identity, different name
            WorkingObject::new(
                "f",
                WorkingMesh::default(),
                vec![textured("m-f", "wall_copy", "g-wall", [255; 4])],
                Mat4::IDENTITY,
            ),
        ];
        let mut group = BuildGroup::new("node", objects);

        let bundles = cache.collect_group_textures(&mut group);
        let names: Vec<&str> = bundles.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["wall", "DefaultWhite", "wall_copy"]);
        assert_eq!(cache.len(), 5);
    }
}
