use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    mesh::parse_mesh,
    scene_db::{JobThreadGuard, NodeAccessor, SceneDatabase},
};

use super::{ImportError, MeshMapInfo};

/// Builds the partitions of every registered mesh on a thread pool.
///
/// Meshes whose arrays are malformed are dropped from the map. Names without a node
/// keep their entry, with no partitions.
pub fn build_meshes(
    db: &dyn SceneDatabase,
    meshes: &mut HashMap<String, MeshMapInfo>,
    worker_threads: usize,
) -> Result<(), ImportError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_threads)
        .thread_name(|index| format!("EssMeshBuild{}", index))
        .build()?;
    let caller = std::thread::current().id();

    let failed: Vec<String> = pool.install(|| {
        meshes
            .par_iter_mut()
            .filter_map(|(name, info)| {
                let _job_thread =
                    (std::thread::current().id() != caller).then(|| JobThreadGuard::new(db));
                build_mesh_entry(db, name, info).then(|| name.clone())
            })
            .collect()
    });

    for name in &failed {
        meshes.remove(name);
    }
    log::debug!(
        "Built {} meshes, dropped {}",
        meshes.len(),
        failed.len()
    );
    Ok(())
}

/// Returns true if the mesh has to be dropped.
fn build_mesh_entry(db: &dyn SceneDatabase, name: &str, info: &mut MeshMapInfo) -> bool {
    let Some(node) = db.find_node(name).and_then(|tag| NodeAccessor::new(db, tag)) else {
        log::debug!("Mesh {} has no node", name);
        return false;
    };
    match parse_mesh(db, &node, info.winding) {
        Ok(meshes) => {
            info.meshes = meshes;
            false
        }
        Err(err) => {
            log::warn!("Skipping mesh {}: {}", name, err);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::WindingOrders,
        scene_db::{MemoryDatabase, NodeDocument, SceneDocument, ValueDocument},
    };

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

    fn entry(original: bool, inverted: bool) -> MeshMapInfo {
        MeshMapInfo {
            winding: WindingOrders { original, inverted },
            meshes: Vec::new(),
        }
    }

    #[test]
    fn builds_every_mesh_and_drops_broken_ones() {
        let broken = NodeDocument::new("broken", "poly")
            .with("triangle_list", ValueDocument::IndexArray(vec![0, 1, 2]));
        let db = MemoryDatabase::from_document(&SceneDocument {
            nodes: vec![triangle("a"), triangle("b"), broken],
        })
        .unwrap();

        let mut meshes = HashMap::new();
        meshes.insert("a".to_string(), entry(true, false));
        meshes.insert("b".to_string(), entry(true, true));
        meshes.insert("broken".to_string(), entry(true, false));
        meshes.insert("absent".to_string(), entry(true, false));

        build_meshes(&db, &mut meshes, 2).unwrap();

        assert!(!meshes.contains_key("broken"));
        assert!(meshes["absent"].meshes.is_empty());
        assert_eq!(meshes["a"].meshes.len(), 1);
        assert!(meshes["a"].meshes[0].invert_triangles.is_empty());
        assert_eq!(meshes["b"].meshes[0].invert_triangles.len(), 3);
        assert_eq!(db.open_accesses(), 0);
        assert_eq!(db.registered_job_threads(), 0);
    }
}
