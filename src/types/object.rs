use glam::Mat4;

use super::material::WorkingMaterial;
use super::mesh::WorkingMesh;

/// One renderable: a mesh, its materials (one per submesh) and its placement.
#[derive(Debug, Clone)]
pub struct WorkingObject {
    pub name: String,
    pub mesh: Option<WorkingMesh>,
    pub materials: Vec<WorkingMaterial>,
    pub local_to_world: Mat4,
}

impl WorkingObject {
    pub fn new(name: impl Into<String>, mesh: WorkingMesh, materials: Vec<WorkingMaterial>, local_to_world: Mat4) -> Self {
        Self {
            name: name.into(),
            mesh: Some(mesh),
            materials,
            local_to_world,
        }
    }

    pub fn set_mesh(&mut self, mesh: WorkingMesh) {
        self.mesh = Some(mesh);
    }
}

/// A set of objects that collapses into one mesh and one material.
#[derive(Debug, Clone, Default)]
pub struct BuildGroup {
    pub name: String,
    pub objects: Vec<WorkingObject>,
}

impl BuildGroup {
    pub fn new(name: impl Into<String>, objects: Vec<WorkingObject>) -> Self {
        Self {
            name: name.into(),
            objects,
        }
    }

    pub fn material_count(&self) -> usize {
        self.objects.iter().map(|o| o.materials.len()).sum()
    }
}
