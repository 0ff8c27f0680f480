use ess_common::MeshInfo;
use ultraviolet::{Vec2, Vec3};

use crate::scene_db::{SceneDatabase, SceneNode, TableAccessor};

use super::{build_partitions, Channel, MeshError, SourceMesh, WindingOrders};

fn table<'db>(
    db: &'db dyn SceneDatabase,
    node: &SceneNode,
    name: &str,
) -> Option<TableAccessor<'db>> {
    TableAccessor::new(db, node.array(name)?)
}

fn required_table<'db>(
    db: &'db dyn SceneDatabase,
    node: &SceneNode,
    name: &'static str,
) -> Result<TableAccessor<'db>, MeshError> {
    table(db, node, name).ok_or(MeshError::MissingArray(name))
}

fn indices<'t>(table: &'t TableAccessor<'_>, name: &'static str) -> Result<&'t [u32], MeshError> {
    table.indices().ok_or(MeshError::WrongArrayType(name))
}

fn vectors(table: &TableAccessor<'_>, name: &'static str) -> Result<Vec<Vec3>, MeshError> {
    Ok(table
        .vectors()
        .ok_or(MeshError::WrongArrayType(name))?
        .iter()
        .map(|v| Vec3::from(*v))
        .collect())
}

fn tex_coords(table: &TableAccessor<'_>, name: &'static str) -> Result<Vec<Vec2>, MeshError> {
    Ok(table
        .vectors()
        .ok_or(MeshError::WrongArrayType(name))?
        .iter()
        .map(|v| Vec2::new(v[0], 1.0 - v[1]))
        .collect())
}

/// An optional channel counts as present only with both its values and its indices.
fn optional_channel<'db>(
    db: &'db dyn SceneDatabase,
    node: &SceneNode,
    values: &'static str,
    indices: &'static str,
) -> Option<(TableAccessor<'db>, TableAccessor<'db>)> {
    match (table(db, node, values), table(db, node, indices)) {
        (Some(values), Some(indices)) => Some((values, indices)),
        (None, None) => None,
        _ => {
            log::warn!(
                "Mesh {} has only one of {} and {}, ignoring the channel",
                node.unique_name,
                values,
                indices
            );
            None
        }
    }
}

fn channel<'a, T>(
    values: Option<&'a [T]>,
    tables: &'a Option<(TableAccessor<'_>, TableAccessor<'_>)>,
    name: &'static str,
) -> Result<Option<Channel<'a, T>>, MeshError> {
    match (values, tables) {
        (Some(values), Some((_, index_table))) => Ok(Some(Channel {
            values,
            indices: indices(index_table, name)?,
        })),
        _ => Ok(None),
    }
}

/// Reads the geometry arrays of a `poly` node and builds its material partitions.
pub fn parse_mesh(
    db: &dyn SceneDatabase,
    node: &SceneNode,
    winding: WindingOrders,
) -> Result<Vec<MeshInfo>, MeshError> {
    let positions_table = required_table(db, node, "pos_list")?;
    let triangles_table = required_table(db, node, "triangle_list")?;
    let normals_table = required_table(db, node, "N")?;
    let normal_indices_table = required_table(db, node, "N_idx")?;

    let uv1_tables = optional_channel(db, node, "uv1", "uv1_idx");
    let uv2_tables = optional_channel(db, node, "uv2", "uv2_idx");
    let tangent_tables = optional_channel(db, node, "dPdu", "dPdu_idx");
    let material_table = table(db, node, "mtl_index");

    let positions = vectors(&positions_table, "pos_list")?;
    let normals = vectors(&normals_table, "N")?;
    let uv1s = uv1_tables
        .as_ref()
        .map(|(values, _)| tex_coords(values, "uv1"))
        .transpose()?;
    let uv2s = uv2_tables
        .as_ref()
        .map(|(values, _)| tex_coords(values, "uv2"))
        .transpose()?;
    let tangents = tangent_tables
        .as_ref()
        .map(|(values, _)| vectors(values, "dPdu"))
        .transpose()?;

    let source = SourceMesh {
        positions: &positions,
        triangle_list: indices(&triangles_table, "triangle_list")?,
        normals: &normals,
        normal_indices: indices(&normal_indices_table, "N_idx")?,
        uv1: channel(uv1s.as_deref(), &uv1_tables, "uv1_idx")?,
        uv2: channel(uv2s.as_deref(), &uv2_tables, "uv2_idx")?,
        tangents: channel(tangents.as_deref(), &tangent_tables, "dPdu_idx")?,
        material_indices: material_table
            .as_ref()
            .map(|table| indices(table, "mtl_index"))
            .transpose()?,
    };

    build_partitions(&source, winding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_db::{MemoryDatabase, NodeAccessor, NodeDocument, SceneDocument, ValueDocument};

    fn triangle(name: &str) -> NodeDocument {
        NodeDocument::new(name, "poly")
            .with(
                "pos_list",
                ValueDocument::VectorArray(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            )
            .with("triangle_list", ValueDocument::IndexArray(vec![0, 1, 2]))
            .with("N", ValueDocument::VectorArray(vec![[0.0, 0.0, 1.0]]))
            .with("N_idx", ValueDocument::IndexArray(vec![0, 0, 0]))
    }

    fn parse(document: NodeDocument) -> Result<Vec<MeshInfo>, MeshError> {
        let name = document.name.clone();
        let db = MemoryDatabase::from_document(&SceneDocument {
            nodes: vec![document],
        })
        .unwrap();
        let result = {
            let node = NodeAccessor::new(&db, db.find_node(&name).unwrap()).unwrap();
            parse_mesh(
                &db,
                &node,
                WindingOrders {
                    original: true,
                    inverted: false,
                },
            )
        };
        assert_eq!(db.open_accesses(), 0);
        result
    }

    #[test]
    fn plain_triangle() {
        let meshes = parse(triangle("tri")).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].vertices.len(), 3);
        assert_eq!(meshes[0].triangles, vec![0, 1, 2]);
    }

    #[test]
    fn missing_normals_fail() {
        let mut document = triangle("tri");
        document.params.retain(|param| param.name != "N");
        assert_eq!(parse(document), Err(MeshError::MissingArray("N")));
    }

    #[test]
    fn wrong_array_type_fails() {
        let mut document = triangle("tri");
        document.params.retain(|param| param.name != "N_idx");
        let document = document.with("N_idx", ValueDocument::VectorArray(vec![[0.0; 3]; 3]));
        assert_eq!(parse(document), Err(MeshError::WrongArrayType("N_idx")));
    }

    #[test]
    fn texture_coordinates_are_flipped() {
        let document = triangle("tri")
            .with("uv1", ValueDocument::VectorArray(vec![[0.25, 0.25, 0.0]]))
            .with("uv1_idx", ValueDocument::IndexArray(vec![0, 0, 0]));
        let meshes = parse(document).unwrap();
        assert_eq!(meshes[0].uv1s[0], Vec2::new(0.25, 0.75));
    }

    #[test]
    fn half_a_channel_is_ignored() {
        let document = triangle("tri").with("uv2", ValueDocument::VectorArray(vec![[0.0; 3]]));
        let meshes = parse(document).unwrap();
        assert!(meshes[0].uv2s.is_empty());
    }

    #[test]
    fn partitions_by_material() {
        let document = NodeDocument::new("quad", "poly")
            .with(
                "pos_list",
                ValueDocument::VectorArray(vec![
                    [0.0, 0.0, 0.0],
                    [1.0, 0.0, 0.0],
                    [1.0, 1.0, 0.0],
                    [0.0, 1.0, 0.0],
                ]),
            )
            .with("triangle_list", ValueDocument::IndexArray(vec![0, 1, 2, 0, 2, 3]))
            .with("N", ValueDocument::VectorArray(vec![[0.0, 0.0, 1.0]]))
            .with("N_idx", ValueDocument::IndexArray(vec![0; 6]))
            .with("dPdu", ValueDocument::VectorArray(vec![[1.0, 0.0, 0.0]]))
            .with("dPdu_idx", ValueDocument::IndexArray(vec![0; 6]))
            .with("mtl_index", ValueDocument::IndexArray(vec![3, 1]));
        let meshes = parse(document).unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[0].material_index, 3);
        assert_eq!(meshes[1].material_index, 1);
        for mesh in &meshes {
            assert_eq!(mesh.vertices.len(), 3);
            assert_eq!(mesh.tangents.len(), 3);
        }
    }
}
