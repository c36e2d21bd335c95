use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use tracing::{debug, warn};

use crate::types::{MAX_UV_CHANNELS, WorkingMesh};

/// One submesh to merge, with the transform that places it in the world.
#[derive(Debug, Clone, Copy)]
pub struct CombineInfo<'a> {
    pub mesh: Option<&'a WorkingMesh>,
    pub submesh: usize,
    pub transform: Mat4,
}

impl<'a> CombineInfo<'a> {
    pub fn new(mesh: &'a WorkingMesh, submesh: usize, transform: Mat4) -> Self {
        Self {
            mesh: Some(mesh),
            submesh,
            transform,
        }
    }
}

/// Attribute channels carried by the merged mesh.
struct Layout {
    normals: bool,
    colors: bool,
    uvs: [bool; MAX_UV_CHANNELS],
}

impl Layout {
    fn of(infos: &[CombineInfo<'_>]) -> Self {
        let mut layout = Layout {
            normals: false,
            colors: false,
            uvs: [false; MAX_UV_CHANNELS],
        };
        for mesh in infos.iter().filter_map(|i| i.mesh) {
            layout.normals |= mesh.has_normals();
            layout.colors |= mesh.has_colors();
            for (ch, present) in layout.uvs.iter_mut().enumerate() {
                *present |= mesh.has_uv_channel(ch);
            }
        }
        layout
    }
}

/// Merges submeshes of many meshes into a single-submesh mesh.
#[derive(Debug, Default)]
pub struct MeshCombiner;

impl MeshCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Merge `infos` into one mesh expressed relative to `root_position`.
    ///
    /// Only vertices referenced by each submesh are copied. Attribute
    /// channels present on any input exist on the output; inputs lacking
    /// them contribute zero normals/UVs and white colors.
    pub fn combine(&self, root_position: Vec3, infos: &[CombineInfo<'_>]) -> WorkingMesh {
        let layout = Layout::of(infos);
        let mut out = WorkingMesh::default();
        let mut indices: Vec<u32> = Vec::new();

        for info in infos {
            let Some(mesh) = info.mesh else {
                continue;
            };
            let triangles = mesh.triangles(info.submesh);
            if triangles.is_empty() {
                debug!(mesh = %mesh.name, submesh = info.submesh, "Skipping empty submesh");
                continue;
            }

            let mut transform = info.transform;
            transform.w_axis -= root_position.extend(0.0);
            let normal_matrix = normal_matrix(&transform);

            let vertex_count = mesh.vertex_count() as u32;
            let mut remap: HashMap<u32, u32> = HashMap::new();

            for tri in triangles.chunks_exact(3) {
                if tri.iter().any(|&i| i >= vertex_count) {
                    warn!(mesh = %mesh.name, submesh = info.submesh, "Skipping triangle with out-of-range index");
                    continue;
                }

                for &src in tri {
                    let dst = *remap.entry(src).or_insert_with(|| {
                        push_vertex(&mut out, &layout, mesh, src as usize, &transform, &normal_matrix)
                    });
                    indices.push(dst);
                }
            }
        }

        out.submeshes = vec![indices];
        debug!(
            inputs = infos.len(),
            vertices = out.vertex_count(),
            triangles = out.triangle_count(),
            "Combined meshes"
        );
        out
    }
}

/// Inverse-transpose of the linear part; singular transforms fall back to the linear part.
fn normal_matrix(transform: &Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(*transform);
    if linear.determinant().abs() > f32::EPSILON {
        linear.inverse().transpose()
    } else {
        linear
    }
}

/// Append vertex `src` of `mesh` to `out`, returning its new index.
fn push_vertex(
    out: &mut WorkingMesh,
    layout: &Layout,
    mesh: &WorkingMesh,
    src: usize,
    transform: &Mat4,
    normal_matrix: &Mat3,
) -> u32 {
    let dst = out.positions.len() as u32;
    out.positions.push(transform.transform_point3(mesh.positions[src]));

    if layout.normals {
        let n = mesh
            .normals
            .get(src)
            .map(|n| (*normal_matrix * *n).normalize_or_zero())
            .unwrap_or(Vec3::ZERO);
        out.normals.push(n);
    }
    if layout.colors {
        out.colors.push(mesh.colors.get(src).copied().unwrap_or(Vec4::ONE));
    }
    for (ch, present) in layout.uvs.iter().enumerate() {
        if *present {
            let uv = mesh.uv_channel(ch).get(src).copied().unwrap_or(Vec2::ZERO);
            out.uvs[ch].push(uv);
        }
    }

    dst
}
