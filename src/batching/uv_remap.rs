use glam::Vec2;
use tracing::{debug, trace};

use crate::types::{MAX_UV_CHANNELS, WorkingMaterial, WorkingMesh};

use super::texture_packer::TextureAtlas;

/// UV assigned to vertices whose material has no real texture.
pub const CENTER_UV: Vec2 = Vec2::splat(0.5);

/// Per-vertex outcomes of a remap pass, summed over every UV channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapStats {
    /// Moved into an atlas region.
    pub remapped: usize,
    /// Forced to [`CENTER_UV`] because the slot holds no identifiable texture.
    pub centered: usize,
    /// Left at (0, 0); each vertex counted once per channel.
    pub unset: usize,
    /// Revisited after already being written in this pass.
    pub already_updated: usize,
    /// Texture has no region on the atlas; UV left as is.
    pub unmapped: usize,
}

impl std::ops::AddAssign for RemapStats {
    fn add_assign(&mut self, rhs: Self) {
        self.remapped += rhs.remapped;
        self.centered += rhs.centered;
        self.unset += rhs.unset;
        self.already_updated += rhs.already_updated;
        self.unmapped += rhs.unmapped;
    }
}

/// Rewrite the UVs of `mesh` in place so they address `atlas`.
///
/// Submesh `i` is looked up through the `main_slot` texture of
/// `materials[i]`; submeshes without a material are left alone. Each vertex
/// is written at most once per channel, by the first submesh that uses it.
pub fn remap_uvs(mesh: &mut WorkingMesh, materials: &[WorkingMaterial], atlas: &TextureAtlas, main_slot: &str) -> RemapStats {
    let mut stats = RemapStats::default();
    let submesh_count = mesh.submesh_count().min(materials.len());
    if mesh.submesh_count() > materials.len() {
        debug!(
            mesh = %mesh.name,
            submeshes = mesh.submesh_count(),
            materials = materials.len(),
            "Ignoring submeshes without a material"
        );
    }

    for channel in 0..MAX_UV_CHANNELS {
        if !mesh.has_uv_channel(channel) {
            continue;
        }

        let mut uvs = std::mem::take(&mut mesh.uvs[channel]);
        let mut updated = vec![false; uvs.len()];
        let mut seen_unset = vec![false; uvs.len()];

        for (mi, material) in materials.iter().enumerate().take(submesh_count) {
            let texture = material.texture(main_slot).filter(|t| !t.id.is_empty());
            let region = texture.and_then(|t| atlas.get_uv(&t.name));

            for &index in mesh.triangles(mi) {
                let i = index as usize;
                if i >= uvs.len() {
                    continue;
                }
                if updated[i] {
                    stats.already_updated += 1;
                    continue;
                }

                match (texture, region) {
                    (None, _) => {
                        uvs[i] = CENTER_UV;
                        stats.centered += 1;
                    }
                    // Unset UVs stay at the origin and may be claimed by a later submesh
                    (Some(_), _) if uvs[i] == Vec2::ZERO => {
                        if !seen_unset[i] {
                            seen_unset[i] = true;
                            stats.unset += 1;
                        }
                        continue;
                    }
                    (Some(_), Some(region)) => {
                        uvs[i] = region.map(uvs[i]);
                        stats.remapped += 1;
                    }
                    (Some(t), None) => {
                        trace!(texture = %t.name, "Texture has no atlas region");
                        stats.unmapped += 1;
                    }
                }
                updated[i] = true;
            }
        }

        mesh.uvs[channel] = uvs;
    }

    stats
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec3;
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::batching::texture_packer::{GroupId, MaterialTexture, TexturePacker};
    use crate::types::{PixelFormat, TextureId, WorkingTexture};

    fn brick() -> WorkingTexture {
        WorkingTexture::from_image("brick", TextureId::new("g-brick"), RgbaImage::from_pixel(16, 16, Rgba([9; 4])))
    }

    fn packed_atlas(textures: Vec<WorkingTexture>) -> TextureAtlas {
        let mut packer = TexturePacker::new();
        let bundles = textures
            .into_iter()
            .map(|t| MaterialTexture::new(vec![std::sync::Arc::new(t)]))
            .collect();
        packer.add_texture_group(GroupId(0), bundles).unwrap();
        packer.pack(PixelFormat::Rgba32, 256, 64, false).unwrap();
        packer.get_atlas(GroupId(0)).unwrap().clone()
    }

    fn triangle(uvs: Vec<Vec2>, submeshes: Vec<Vec<u32>>) -> WorkingMesh {
        WorkingMesh {
            name: "tri".into(),
            positions: vec![Vec3::ZERO; uvs.len()],
            uvs: [uvs, vec![], vec![], vec![], vec![]],
            submeshes,
            ..Default::default()
        }
    }

    #[test]
    fn uvs_are_lerped_into_the_region() {
        let atlas = packed_atlas(vec![brick()]);
        let region = atlas.get_uv("brick").unwrap();
        let mut mesh = triangle(
            vec![Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.25, 0.75)],
            vec![vec![0, 1, 2]],
        );
        let materials = [WorkingMaterial::new("m", "M").with_texture("_MainTex", brick())];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        assert_eq!(stats.remapped, 3);

        assert_relative_eq!(mesh.uvs[0][0].x, region.x_max(), epsilon = 1e-6);
        assert_relative_eq!(mesh.uvs[0][0].y, region.y_min(), epsilon = 1e-6);
        assert_relative_eq!(mesh.uvs[0][1].x, region.x_max(), epsilon = 1e-6);
        assert_relative_eq!(mesh.uvs[0][1].y, region.y_max(), epsilon = 1e-6);
        assert_relative_eq!(mesh.uvs[0][2].x, region.x_min() + 0.25 * (region.x_max() - region.x_min()), epsilon = 1e-6);
        assert_relative_eq!(mesh.uvs[0][2].y, region.y_min() + 0.75 * (region.y_max() - region.y_min()), epsilon = 1e-6);
    }

    #[test]
    fn shared_vertices_are_remapped_once() {
        let atlas = packed_atlas(vec![brick()]);
        let region = atlas.get_uv("brick").unwrap();
        let mut mesh = triangle(
            vec![Vec2::new(0.5, 0.5), Vec2::new(1.0, 0.5), Vec2::new(0.5, 1.0), Vec2::new(1.0, 1.0)],
            vec![vec![0, 1, 2], vec![1, 3, 2]],
        );
        let tex = brick();
        let materials = [
            WorkingMaterial::new("a", "A").with_texture("_MainTex", tex.clone()),
            WorkingMaterial::new("b", "B").with_texture("_MainTex", tex),
        ];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        assert_eq!(stats.remapped, 4);
        assert_eq!(stats.already_updated, 2);
        assert_eq!(mesh.uvs[0][1], region.map(Vec2::new(1.0, 0.5)));
    }

    #[test]
    fn origin_uv_is_left_untouched() {
        let atlas = packed_atlas(vec![brick()]);
        let mut mesh = triangle(vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::ONE], vec![vec![0, 1, 2]]);
        let materials = [WorkingMaterial::new("m", "M").with_texture("_MainTex", brick())];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        assert_eq!(mesh.uvs[0][0], Vec2::ZERO);
        assert_eq!(stats.unset, 1);
        assert_eq!(stats.remapped, 2);
    }

    #[test]
    fn shared_origin_vertex_is_counted_once() {
        let atlas = packed_atlas(vec![brick()]);
        let mut mesh = triangle(
            vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::ONE, Vec2::new(0.0, 1.0)],
            vec![vec![0, 1, 2, 0, 2, 3]],
        );
        let materials = [WorkingMaterial::new("m", "M").with_texture("_MainTex", brick())];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        assert_eq!(stats.unset, 1);
        assert_eq!(stats.remapped, 3);
        assert_eq!(stats.already_updated, 1);
        assert_eq!(mesh.uvs[0][0], Vec2::ZERO);
    }

    #[test]
    fn absent_or_generated_textures_center_the_uv() {
        let atlas = packed_atlas(vec![brick()]);
        let mut mesh = triangle(
            vec![Vec2::ZERO, Vec2::new(0.9, 0.1), Vec2::new(0.3, 0.7), Vec2::new(0.2, 0.2)],
            vec![vec![0, 1, 2], vec![3, 3, 3]],
        );
        let filler = WorkingTexture::solid("DefaultWhite", 4, 4, glam::Vec4::ONE, false);
        let materials = [
            WorkingMaterial::new("bare", "Bare"),
            WorkingMaterial::new("filled", "Filled").with_texture("_MainTex", filler),
        ];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        for uv in &mesh.uvs[0] {
            assert_eq!(*uv, Vec2::new(0.5, 0.5));
        }
        assert_eq!(stats.centered, 4);
        assert_eq!(stats.already_updated, 2);
    }

    #[test]
    fn extra_submeshes_and_empty_channels_are_skipped() {
        let atlas = packed_atlas(vec![brick()]);
        let mut mesh = triangle(
            vec![Vec2::new(0.5, 0.5), Vec2::new(1.0, 0.5), Vec2::new(0.5, 1.0), Vec2::new(0.7, 0.7)],
            vec![vec![0, 1, 2], vec![3, 3, 3]],
        );
        mesh.uvs[2] = vec![Vec2::new(0.1, 0.1); 4];
        let materials = [WorkingMaterial::new("m", "M").with_texture("_MainTex", brick())];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        // Vertex 3 belongs to a submesh without a material
        assert_eq!(mesh.uvs[0][3], Vec2::new(0.7, 0.7));
        assert_eq!(mesh.uvs[2][3], Vec2::new(0.1, 0.1));
        // Channels 0 and 2 remapped, 1 absent
        assert_eq!(stats.remapped, 6);
        assert!(mesh.uvs[1].is_empty());
    }

    #[test]
    fn textures_missing_from_atlas_are_counted() {
        let atlas = packed_atlas(vec![brick()]);
        let stranger = WorkingTexture::from_image("stranger", TextureId::new("g-x"), RgbaImage::new(4, 4));
        let mut mesh = triangle(vec![Vec2::new(0.3, 0.3); 3], vec![vec![0, 1, 2]]);
        let materials = [WorkingMaterial::new("m", "M").with_texture("_MainTex", stranger)];

        let stats = remap_uvs(&mut mesh, &materials, &atlas, "_MainTex");
        assert_eq!(stats.unmapped, 3);
        assert_eq!(mesh.uvs[0][0], Vec2::new(0.3, 0.3));
    }
}
