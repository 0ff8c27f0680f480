use serde::{Deserialize, Serialize};

use crate::transform::NodeTransform;

/// An instance of a polygon mesh in the scene.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub mesh_name: String,
    pub transform: NodeTransform,
    pub invert_vertex_order: bool,
    /// Names of the materials in `mtl_list`, indexed by the mesh's per-face material index.
    pub material_names: Vec<String>,
}
