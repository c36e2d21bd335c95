use meshopt::{SimplifyOptions, VertexDataAdapter};
use tracing::debug;

use crate::config::SimplifierConfig;
use crate::error::{HlodError, Result};
use crate::types::WorkingMesh;

use super::{Simplifier, SimplifyOperation, Step};

/// Simplification engine backed by meshoptimizer.
#[derive(Debug, Clone)]
pub struct MeshoptSimplifier {
    pub lock_border: bool,
    /// Relative error budget passed to `meshopt::simplify`.
    pub target_error: f32,
}

impl Default for MeshoptSimplifier {
    fn default() -> Self {
        Self::from_config(&SimplifierConfig::default())
    }
}

impl MeshoptSimplifier {
    pub fn from_config(config: &SimplifierConfig) -> Self {
        Self {
            lock_border: config.lock_border,
            target_error: config.target_error,
        }
    }
}

impl Simplifier for MeshoptSimplifier {
    fn algorithm(&self) -> &str {
        "meshopt"
    }

    fn start(&self, source: &WorkingMesh, target_vertices: usize) -> Result<Box<dyn SimplifyOperation>> {
        Ok(Box::new(MeshoptOperation {
            source: source.clone(),
            target_vertices,
            lock_border: self.lock_border,
            target_error: self.target_error,
            ratio: 1.0,
            phase: Phase::Prepare,
            submeshes: Vec::with_capacity(source.submesh_count()),
            achieved_error: 0.0,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prepare,
    Submesh(usize),
    Compact,
    Finished,
}

/// Resumable reduction of one mesh: validate, one step per submesh, compact.
struct MeshoptOperation {
    source: WorkingMesh,
    target_vertices: usize,
    lock_border: bool,
    target_error: f32,
    /// Fraction of indices to keep in every submesh.
    ratio: f64,
    phase: Phase,
    submeshes: Vec<Vec<u32>>,
    achieved_error: f32,
}

impl MeshoptOperation {
    fn progress(&self) -> f32 {
        let total = self.source.submesh_count() + 2;
        let done = match self.phase {
            Phase::Prepare => 0,
            Phase::Submesh(i) => i + 1,
            Phase::Compact => total - 1,
            Phase::Finished => total,
        };
        done as f32 / total as f32
    }

    fn prepare(&mut self) -> Result<()> {
        let vertex_count = self.source.vertex_count();
        if let Some(bad) = self
            .source
            .submeshes
            .iter()
            .flatten()
            .find(|&&i| i as usize >= vertex_count)
        {
            return Err(HlodError::Simplify(format!(
                "mesh '{}' references vertex {bad} of {vertex_count}",
                self.source.name
            )));
        }

        let unique = self.source.unique_vertex_count();
        self.ratio = if unique == 0 {
            1.0
        } else {
            (self.target_vertices as f64 / unique as f64).min(1.0)
        };
        debug!(
            mesh = %self.source.name,
            vertices = unique,
            target = self.target_vertices,
            ratio = self.ratio,
            "Simplification prepared"
        );
        Ok(())
    }

    fn simplify_submesh(&mut self, index: usize) -> Result<()> {
        let indices = self.source.triangles(index);
        if indices.is_empty() || self.ratio >= 1.0 {
            self.submeshes.push(indices.to_vec());
            return Ok(());
        }

        let positions: &[u8] = bytemuck::cast_slice(self.source.positions.as_slice());
        let adapter = VertexDataAdapter::new(positions, std::mem::size_of::<glam::Vec3>(), 0)
            .map_err(|e| HlodError::Simplify(format!("invalid vertex buffer: {e:?}")))?;

        // Whole triangles only
        let target_count = ((indices.len() as f64 * self.ratio) as usize / 3) * 3;

        let options = if self.lock_border {
            SimplifyOptions::LockBorder
        } else {
            SimplifyOptions::None
        };

        let mut result_error: f32 = 0.0;
        let reduced = meshopt::simplify(
            indices,
            &adapter,
            target_count,
            self.target_error,
            options,
            Some(&mut result_error),
        );
        let reduced = meshopt::optimize_vertex_cache(&reduced, self.source.vertex_count());

        self.achieved_error = self.achieved_error.max(result_error);
        self.submeshes.push(reduced);
        Ok(())
    }
}

impl SimplifyOperation for MeshoptOperation {
    fn advance(&mut self) -> Result<Step<WorkingMesh>> {
        match self.phase {
            Phase::Prepare => {
                self.prepare()?;
                self.phase = if self.source.submesh_count() == 0 {
                    Phase::Compact
                } else {
                    Phase::Submesh(0)
                };
            }
            Phase::Submesh(i) => {
                self.simplify_submesh(i)?;
                self.phase = if i + 1 < self.source.submesh_count() {
                    Phase::Submesh(i + 1)
                } else {
                    Phase::Compact
                };
            }
            Phase::Compact => {
                let submeshes = std::mem::take(&mut self.submeshes);
                let mesh = compact_mesh(submeshes, &self.source);
                debug!(
                    mesh = %mesh.name,
                    before = self.source.vertex_count(),
                    after = mesh.vertex_count(),
                    error = self.achieved_error,
                    "Simplification complete"
                );
                self.phase = Phase::Finished;
                return Ok(Step::Done(mesh));
            }
            Phase::Finished => {
                return Err(HlodError::Simplify("operation advanced after completion".into()));
            }
        }
        Ok(Step::Continue(self.progress()))
    }
}

/// Rebuild `source` around `submeshes`, dropping vertices no submesh references.
///
/// Vertex order follows first use across the submeshes in order.
pub fn compact_mesh(submeshes: Vec<Vec<u32>>, source: &WorkingMesh) -> WorkingMesh {
    let mut remap = vec![u32::MAX; source.vertex_count()];
    let mut order: Vec<usize> = Vec::new();

    let submeshes: Vec<Vec<u32>> = submeshes
        .into_iter()
        .map(|indices| {
            indices
                .into_iter()
                .map(|idx| {
                    let i = idx as usize;
                    if remap[i] == u32::MAX {
                        remap[i] = order.len() as u32;
                        order.push(i);
                    }
                    remap[i]
                })
                .collect()
        })
        .collect();

    let gather = |attr_len: usize| attr_len == source.vertex_count();
    let mut out = WorkingMesh {
        name: source.name.clone(),
        positions: order.iter().map(|&i| source.positions[i]).collect(),
        submeshes,
        source: source.source.clone(),
        ..Default::default()
    };
    if gather(source.normals.len()) {
        out.normals = order.iter().map(|&i| source.normals[i]).collect();
    }
    if gather(source.colors.len()) {
        out.colors = order.iter().map(|&i| source.colors[i]).collect();
    }
    for (ch, uvs) in source.uvs.iter().enumerate() {
        if gather(uvs.len()) {
            out.uvs[ch] = order.iter().map(|&i| uvs[i]).collect();
        }
    }
    out
}
