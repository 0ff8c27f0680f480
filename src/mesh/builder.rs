use std::collections::{hash_map::Entry, HashMap};

use ess_common::{MeshInfo, UNASSIGNED_MATERIAL};
use ultraviolet::{Vec2, Vec3};

use super::{MeshError, VertexKey, VertexKeyMap};

/// An optional per-corner attribute: values plus one index per corner.
#[derive(Clone, Copy, Debug)]
pub struct Channel<'a, T> {
    pub values: &'a [T],
    pub indices: &'a [u32],
}

/// Indexed source geometry. Every per-corner index array runs parallel to `triangle_list`.
#[derive(Clone, Copy, Debug)]
pub struct SourceMesh<'a> {
    pub positions: &'a [Vec3],
    pub triangle_list: &'a [u32],
    pub normals: &'a [Vec3],
    pub normal_indices: &'a [u32],
    pub uv1: Option<Channel<'a, Vec2>>,
    pub uv2: Option<Channel<'a, Vec2>>,
    pub tangents: Option<Channel<'a, Vec3>>,
    /// One entry per face.
    pub material_indices: Option<&'a [u32]>,
}

/// Which triangle orders the instances of a mesh need.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindingOrders {
    pub original: bool,
    pub inverted: bool,
}

/// The faces of one material, as corner indices into the source arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacePartition {
    pub material_index: i32,
    pub corners: Vec<u32>,
}

fn lookup<T: Copy>(array: &'static str, values: &[T], index: usize) -> Result<T, MeshError> {
    values
        .get(index)
        .copied()
        .ok_or(MeshError::IndexOutOfRange {
            array,
            index,
            len: values.len(),
        })
}

impl<'a> SourceMesh<'a> {
    pub fn channel_count(&self) -> usize {
        2 + self.uv1.is_some() as usize + self.uv2.is_some() as usize + self.tangents.is_some() as usize
    }

    pub fn face_count(&self) -> usize {
        self.triangle_list.len() / 3
    }

    fn vertex_key(&self, corner: u32) -> Result<VertexKey, MeshError> {
        let corner = corner as usize;
        let mut indices = [0; super::MAX_VERTEX_CHANNELS];
        indices[0] = lookup("triangle_list", self.triangle_list, corner)?;
        indices[1] = lookup("N_idx", self.normal_indices, corner)?;
        let mut count = 2;
        if let Some(uv1) = &self.uv1 {
            indices[count] = lookup("uv1_idx", uv1.indices, corner)?;
            count += 1;
        }
        if let Some(uv2) = &self.uv2 {
            indices[count] = lookup("uv2_idx", uv2.indices, corner)?;
            count += 1;
        }
        if let Some(tangents) = &self.tangents {
            indices[count] = lookup("dPdu_idx", tangents.indices, corner)?;
            count += 1;
        }
        Ok(VertexKey::new(&indices[..count]))
    }

    /// Appends the attributes a key points at. Validates all of them before touching `mesh`.
    fn push_vertex(&self, mesh: &mut MeshInfo, key: &VertexKey) -> Result<(), MeshError> {
        let mut channels = key.indices().iter().map(|index| *index as usize);
        let mut next = || channels.next().unwrap_or_default();

        let position = lookup("pos_list", self.positions, next())?;
        let normal = lookup("N", self.normals, next())?;
        let uv1 = self
            .uv1
            .as_ref()
            .map(|uv1| lookup("uv1", uv1.values, next()))
            .transpose()?;
        let uv2 = self
            .uv2
            .as_ref()
            .map(|uv2| lookup("uv2", uv2.values, next()))
            .transpose()?;
        let tangent = self
            .tangents
            .as_ref()
            .map(|tangents| lookup("dPdu", tangents.values, next()))
            .transpose()?;

        mesh.vertices.push(position);
        mesh.normals.push(normal);
        mesh.uv1s.extend(uv1);
        mesh.uv2s.extend(uv2);
        mesh.tangents.extend(tangent);
        Ok(())
    }
}

/// Buckets faces by material, in order of first appearance.
///
/// The returned corners already account for the requested winding: with the original
/// order required, each face is gathered as (0, 2, 1), since the instance transforms get
/// mirrored along Y on import.
pub fn partition_faces(
    source: &SourceMesh<'_>,
    winding: WindingOrders,
) -> Result<Vec<FacePartition>, MeshError> {
    let (second, third) = if winding.original { (2, 1) } else { (1, 2) };
    let face_corners = |face: u32| [face * 3, face * 3 + second, face * 3 + third];
    let face_count = source.face_count() as u32;

    let Some(material_indices) = source.material_indices else {
        return Ok(vec![FacePartition {
            material_index: UNASSIGNED_MATERIAL,
            corners: (0..face_count).flat_map(face_corners).collect(),
        }]);
    };

    let mut partitions: Vec<FacePartition> = Vec::new();
    let mut material_to_partition = HashMap::new();
    for face in 0..face_count {
        let raw_index = lookup("mtl_index", material_indices, face as usize)?;
        // Indices past i32::MAX cannot name a material slot.
        let material_index = i32::try_from(raw_index).unwrap_or(UNASSIGNED_MATERIAL);
        let partition = *material_to_partition
            .entry(material_index)
            .or_insert_with(|| {
                partitions.push(FacePartition {
                    material_index,
                    corners: Vec::new(),
                });
                partitions.len() - 1
            });
        partitions[partition].corners.extend(face_corners(face));
    }
    Ok(partitions)
}

/// Welds the given corners into one mesh partition.
pub fn build_mesh(
    source: &SourceMesh<'_>,
    partition: &FacePartition,
    winding: WindingOrders,
) -> Result<MeshInfo, MeshError> {
    let mut mesh = MeshInfo::new(partition.material_index);
    let mut vertex_map = VertexKeyMap::default();
    let mut indices = Vec::with_capacity(partition.corners.len());

    for &corner in &partition.corners {
        let key = source.vertex_key(corner)?;
        let index = match vertex_map.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = mesh.vertices.len() as u32;
                source.push_vertex(&mut mesh, entry.key())?;
                *entry.insert(index)
            }
        };
        indices.push(index);
    }

    match (winding.original, winding.inverted) {
        (true, inverted) => {
            if inverted {
                mesh.invert_triangles = indices
                    .chunks_exact(3)
                    .flat_map(|face| [face[0], face[2], face[1]])
                    .collect();
            }
            mesh.triangles = indices;
        }
        (false, true) => mesh.invert_triangles = indices,
        (false, false) => {}
    }
    Ok(mesh)
}

/// Partitions the faces by material and welds each partition on its own.
pub fn build_partitions(
    source: &SourceMesh<'_>,
    winding: WindingOrders,
) -> Result<Vec<MeshInfo>, MeshError> {
    partition_faces(source, winding)?
        .iter()
        .map(|partition| build_mesh(source, partition, winding))
        .collect()
}
