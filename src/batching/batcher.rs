use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use tracing::{debug, info, warn};

use crate::config::{BatcherConfig, PackingType};
use crate::error::{HlodError, Result};
use crate::types::{BuildGroup, WorkingMaterial, WorkingObject};

use super::mesh_combiner::{CombineInfo, MeshCombiner};
use super::texture_cache::MaterialTextureCache;
use super::texture_packer::{AtlasId, GroupId, TextureAtlas, TexturePacker};
use super::uv_remap::{RemapStats, remap_uvs};

/// Summary of one batch invocation.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Groups collapsed to a single object.
    pub groups: usize,
    pub atlases: usize,
    /// Distinct textures handed to the packer.
    pub textures: usize,
    /// Groups that did not fit the configured atlas size.
    pub overflow_groups: Vec<GroupId>,
    pub remap: RemapStats,
}

/// Collapses every build group into one mesh and one atlas-backed material.
///
/// Materials created for the atlases are owned by the batcher and released
/// by [`dispose`](Self::dispose) or on drop.
pub struct SimpleBatcher {
    config: BatcherConfig,
    created_materials: BTreeMap<AtlasId, WorkingMaterial>,
}

impl SimpleBatcher {
    pub fn new(config: BatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            created_materials: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Materials created by the most recent batch, keyed by atlas.
    pub fn created_materials(&self) -> &BTreeMap<AtlasId, WorkingMaterial> {
        &self.created_materials
    }

    /// Merge each group in place, replacing its objects with one combined object.
    ///
    /// `on_progress` receives non-decreasing fractions from 0.0 to 1.0.
    pub fn batch(
        &mut self,
        root_position: Vec3,
        groups: &mut [BuildGroup],
        mut on_progress: impl FnMut(f32),
    ) -> Result<BatchReport> {
        on_progress(0.0);
        self.dispose();

        let mut packer = TexturePacker::new();
        self.pack_textures(&mut packer, groups, &mut on_progress)?;

        let mut report = BatchReport {
            atlases: packer.get_all_atlases().len(),
            textures: packer.texture_count(),
            overflow_groups: packer.overflow_groups().to_vec(),
            ..Default::default()
        };

        let count = groups.len();
        for (i, group) in groups.iter_mut().enumerate() {
            let Some(atlas) = packer.get_atlas(GroupId(i)) else {
                warn!(group = %group.name, "No atlas for group, leaving it unmerged");
                continue;
            };
            report.remap += self.combine(root_position, atlas, group)?;
            report.groups += 1;
            on_progress(0.5 + (i as f32 / count as f32) * 0.5);
        }

        on_progress(1.0);
        info!(
            groups = report.groups,
            atlases = report.atlases,
            textures = report.textures,
            overflow = report.overflow_groups.len(),
            "Batching complete"
        );
        Ok(report)
    }

    /// Release every material created by the last batch.
    pub fn dispose(&mut self) {
        if !self.created_materials.is_empty() {
            debug!(materials = self.created_materials.len(), "Releasing created materials");
            self.created_materials.clear();
        }
    }

    fn pack_textures(
        &mut self,
        packer: &mut TexturePacker,
        groups: &mut [BuildGroup],
        on_progress: &mut impl FnMut(f32),
    ) -> Result<()> {
        let mut cache = MaterialTextureCache::new(&self.config);
        let count = groups.len();

        for (i, group) in groups.iter_mut().enumerate() {
            let textures = cache.collect_group_textures(group);
            debug!(group = %group.name, textures = textures.len(), "Collected group textures");
            packer.add_texture_group(GroupId(i), textures)?;
            on_progress((i as f32 / count as f32) * 0.1);
        }

        packer.pack(
            self.config.format,
            self.config.pack_texture_size,
            self.config.limit_texture_size,
            self.config.allow_rotation,
        )?;
        on_progress(0.3);

        for (index, atlas) in packer.get_all_atlases().iter().enumerate() {
            let material = self.create_material(index + 1, atlas);
            self.created_materials.insert(atlas.id, material);
        }
        Ok(())
    }

    /// Material exposing the channel images of `atlas` under the output slot names.
    fn create_material(&self, index: usize, atlas: &TextureAtlas) -> WorkingMaterial {
        let name = format!("CombinedMaterial {index}");
        let mut material = match &self.config.material_template {
            Some(template) => WorkingMaterial::reference(template.clone(), name),
            None => WorkingMaterial::new(format!("combined-material-{index}"), name),
        };

        for (i, (texture, channel)) in atlas.textures.iter().zip(&self.config.channels).enumerate() {
            let mut texture = texture.clone();
            texture.name = format!("CombinedTexture {index}_{i}");
            if channel.packing == PackingType::Normal {
                texture.linear = true;
            }
            material.set_texture(channel.output_name.clone(), Arc::new(texture));
        }
        material
    }

    fn combine(&self, root_position: Vec3, atlas: &TextureAtlas, group: &mut BuildGroup) -> Result<RemapStats> {
        let main_slot = &self.config.main_channel().input_name;

        let mut stats = RemapStats::default();
        for object in &mut group.objects {
            if let Some(mesh) = object.mesh.as_mut() {
                stats += remap_uvs(mesh, &object.materials, atlas, main_slot);
            }
        }

        let infos: Vec<CombineInfo<'_>> = group
            .objects
            .iter()
            .filter_map(|o| o.mesh.as_ref().map(|m| (m, o.local_to_world)))
            .flat_map(|(mesh, transform)| (0..mesh.submesh_count()).map(move |si| CombineInfo::new(mesh, si, transform)))
            .collect();

        let mut combined = MeshCombiner::new().combine(root_position, &infos);
        combined.name = format!("{}_Mesh", group.name);

        let material = self
            .created_materials
            .get(&atlas.id)
            .cloned()
            .ok_or_else(|| HlodError::Packing(format!("no material created for atlas {}", atlas.id.0)))?;

        debug!(
            group = %group.name,
            objects = group.objects.len(),
            vertices = combined.vertex_count(),
            remapped = stats.remapped,
            "Merged group"
        );

        let merged = WorkingObject::new(
            group.name.clone(),
            combined,
            vec![material],
            Mat4::from_translation(root_position),
        );
        group.objects = vec![merged];
        Ok(stats)
    }
}

impl Drop for SimpleBatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}
