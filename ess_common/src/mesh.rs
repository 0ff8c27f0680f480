use serde::{Deserialize, Serialize};
use ultraviolet::{Vec2, Vec3};

/// Material index of the single partition of a mesh without per-face materials.
pub const UNASSIGNED_MATERIAL: i32 = -1;

/// One material partition of a source mesh, with welded vertices.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MeshInfo {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Empty when the source mesh has no such channel.
    pub uv1s: Vec<Vec2>,
    pub uv2s: Vec<Vec2>,
    pub tangents: Vec<Vec3>,
    pub triangles: Vec<u32>,
    pub invert_triangles: Vec<u32>,
    pub material_index: i32,
}

impl MeshInfo {
    pub fn new(material_index: i32) -> Self {
        Self {
            material_index,
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// The index list to draw this partition with, for an instance of the given winding.
    pub fn triangles_for(&self, invert_vertex_order: bool) -> &[u32] {
        if invert_vertex_order {
            &self.invert_triangles
        } else {
            &self.triangles
        }
    }
}

/// What a host mesh component consumes for one section.
#[derive(Debug, Clone, Copy)]
pub struct MeshSection<'a> {
    pub material_index: i32,
    pub vertices: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub uv0: &'a [Vec2],
    pub uv1: &'a [Vec2],
    pub tangents: &'a [Vec3],
    pub triangles: &'a [u32],
}

impl<'a> MeshSection<'a> {
    pub fn new(mesh: &'a MeshInfo, invert_vertex_order: bool) -> Self {
        Self {
            material_index: mesh.material_index,
            vertices: &mesh.vertices,
            normals: &mesh.normals,
            uv0: &mesh.uv1s,
            uv1: &mesh.uv2s,
            tangents: &mesh.tangents,
            triangles: mesh.triangles_for(invert_vertex_order),
        }
    }
}
