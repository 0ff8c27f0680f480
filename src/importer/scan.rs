use ess_common::{transform::NodeTransform, NodeInfo};

use crate::{
    config::ImporterConfig,
    scene_db::{NodeAccessor, SceneDatabase, TableAccessor, Tag},
};

use super::ImportedScene;

/// Records every instance of a `poly` element, and which windings each mesh needs.
/// Meshes are only registered here; their geometry is built afterwards.
pub fn scan_instances(
    db: &dyn SceneDatabase,
    instances: &[Option<Tag>],
    config: &ImporterConfig,
) -> ImportedScene {
    let mut scene = ImportedScene::default();
    for tag in instances.iter().flatten() {
        if let Some(node) = NodeAccessor::new(db, *tag) {
            insert_node_info(db, &node, config, &mut scene);
        }
    }
    scene
}

fn insert_node_info(
    db: &dyn SceneDatabase,
    node: &NodeAccessor<'_>,
    config: &ImporterConfig,
    scene: &mut ImportedScene,
) {
    let Some(element) = node
        .node("element")
        .and_then(|tag| NodeAccessor::new(db, tag))
    else {
        log::debug!("Instance {} has no element", node.unique_name);
        return;
    };
    if element.desc != "poly" {
        return;
    }

    let mesh_map_info = scene.meshes.entry(element.unique_name.clone()).or_default();
    let mut node_info = NodeInfo {
        name: node.unique_name.clone(),
        mesh_name: element.unique_name.clone(),
        transform: NodeTransform::default(),
        invert_vertex_order: false,
        material_names: material_names(db, node),
    };

    if let Some(matrix) = node.matrix("transform") {
        node_info.transform = NodeTransform::from_row_major(matrix);
        if config.invert_winding_for_negative_scale && node_info.transform.is_mirrored() {
            mesh_map_info.winding.inverted = true;
            node_info.invert_vertex_order = true;
        } else {
            mesh_map_info.winding.original = true;
        }
        node_info.transform.flip_y_axis();
    }

    scene.nodes.push(node_info);
}

fn material_names(db: &dyn SceneDatabase, node: &NodeAccessor<'_>) -> Vec<String> {
    let Some(materials) = node
        .array("mtl_list")
        .and_then(|tag| TableAccessor::new(db, tag))
    else {
        return Vec::new();
    };
    materials
        .tags()
        .unwrap_or_default()
        .iter()
        .flatten()
        .filter_map(|tag| NodeAccessor::new(db, *tag))
        .map(|material| material.unique_name.clone())
        .collect()
}
