use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use ess_importer::{
    config::ImporterConfig,
    ess_common::UNASSIGNED_MATERIAL,
    importer::{EssImporter, ImportError, ImportStatus},
    scene_db::{MemoryDatabase, NodeDocument, SceneDocument, ValueDocument},
};

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
const MIRRORED: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, -1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// A scene file in the temp dir, removed on drop.
struct SceneFile(PathBuf);

impl SceneFile {
    fn write(content: &str) -> Self {
        let path = std::env::temp_dir().join(format!("ess-scene-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        Self(path)
    }

    fn document(nodes: Vec<NodeDocument>) -> Self {
        Self::write(&serde_json::to_string(&SceneDocument { nodes }).unwrap())
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SceneFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

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

fn instance(name: &str, element: &str, transform: [f32; 16]) -> NodeDocument {
    NodeDocument::new(name, "instance")
        .with("element", ValueDocument::Node(element.into()))
        .with("transform", ValueDocument::Matrix(transform))
}

fn group(instances: &[&str]) -> NodeDocument {
    NodeDocument::new("mtoer_instgroup_00", "instgroup").with(
        "instance_list",
        ValueDocument::NodeArray(instances.iter().map(|name| name.to_string()).collect()),
    )
}

fn wait_for(importer: &EssImporter) {
    for _ in 0..1000 {
        if importer.check_parse_finished() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("Import of {:?} did not finish", importer.path());
}

#[test]
fn imports_a_single_triangle() {
    let file = SceneFile::document(vec![
        group(&["inst"]),
        instance("inst", "tri", IDENTITY),
        triangle("tri"),
    ]);
    let db = Arc::new(MemoryDatabase::new());
    let importer = EssImporter::initialize(file.path(), db.clone(), ImporterConfig::default()).unwrap();
    wait_for(&importer);
    assert!(!importer.check_parse_finished());

    assert_eq!(importer.status(), ImportStatus::ParsedOk);
    assert!(importer.parse_result());
    assert_eq!(importer.node_count(), 1);
    let node = importer.node_info(0).unwrap();
    assert_eq!(node.name, "inst");
    assert_eq!(node.mesh_name, "tri");
    assert!(!node.invert_vertex_order);

    let meshes = importer.mesh_info("tri").unwrap();
    assert_eq!(meshes.len(), 1);
    assert_eq!(meshes[0].vertex_count(), 3);
    assert_eq!(meshes[0].triangles, vec![0, 1, 2]);
    assert!(meshes[0].invert_triangles.is_empty());
    assert_eq!(meshes[0].material_index, UNASSIGNED_MATERIAL);

    let sections: Vec<_> = importer.scene().unwrap().sections_for_node(node).collect();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].triangles, &[0, 1, 2]);
}

#[test]
fn mirrored_instances_share_the_mesh() {
    let file = SceneFile::document(vec![
        group(&["a", "b"]),
        instance("a", "tri", IDENTITY),
        instance("b", "tri", MIRRORED),
        triangle("tri"),
    ]);
    let importer = EssImporter::initialize(
        file.path(),
        Arc::new(MemoryDatabase::new()),
        ImporterConfig::default(),
    )
    .unwrap();
    wait_for(&importer);

    assert_eq!(importer.node_count(), 2);
    let mirrored = importer.node_info(1).unwrap();
    assert!(mirrored.invert_vertex_order);

    let mesh = &importer.mesh_info("tri").unwrap()[0];
    assert_eq!(mesh.triangles, vec![0, 1, 2]);
    assert_eq!(mesh.invert_triangles, vec![0, 2, 1]);
    let section = importer
        .scene()
        .unwrap()
        .sections_for_node(mirrored)
        .next()
        .unwrap();
    assert_eq!(section.triangles, &[0, 2, 1]);
}

#[test]
fn non_poly_elements_and_broken_meshes_are_skipped() {
    let broken = NodeDocument::new("broken", "poly")
        .with("pos_list", ValueDocument::VectorArray(vec![[0.0; 3]]));
    let file = SceneFile::document(vec![
        group(&["light_inst", "broken_inst", "tri_inst"]),
        instance("light_inst", "light", IDENTITY),
        NodeDocument::new("light", "pointlight"),
        instance("broken_inst", "broken", IDENTITY),
        broken,
        instance("tri_inst", "tri", IDENTITY),
        triangle("tri"),
    ]);
    let importer = EssImporter::initialize(
        file.path(),
        Arc::new(MemoryDatabase::new()),
        ImporterConfig::default(),
    )
    .unwrap();
    wait_for(&importer);

    assert!(importer.parse_result());
    assert_eq!(importer.node_count(), 2);
    assert!(importer.mesh_info("broken").is_none());
    assert!(importer.mesh_info("light").is_none());
    assert_eq!(importer.mesh_info("tri").unwrap().len(), 1);
}

#[test]
fn missing_file_fails_immediately() {
    let path = std::env::temp_dir().join(format!("ess-missing-{}.json", uuid::Uuid::new_v4()));
    let db = Arc::new(MemoryDatabase::new());
    let result = EssImporter::initialize(&path, db.clone(), ImporterConfig::default());
    assert!(matches!(result, Err(ImportError::SourceMissing(missing)) if missing == path));
    assert_eq!(db.context_depth(), 0);
}

#[test]
fn malformed_scene_fails_in_the_background() {
    let file = SceneFile::write("{ this is not a scene");
    let importer = EssImporter::initialize(
        file.path(),
        Arc::new(MemoryDatabase::new()),
        ImporterConfig::default(),
    )
    .unwrap();
    wait_for(&importer);

    assert_eq!(importer.status(), ImportStatus::ParsedFailed);
    assert!(!importer.parse_result());
    assert!(importer.scene().is_none());
    assert_eq!(importer.node_count(), 0);
    assert!(importer.mesh_info("tri").is_none());
}

#[test]
fn missing_instance_group_fails() {
    let file = SceneFile::document(vec![triangle("tri")]);
    let config = ImporterConfig {
        instance_group: "elsewhere".into(),
        ..Default::default()
    };
    let importer =
        EssImporter::initialize(file.path(), Arc::new(MemoryDatabase::new()), config).unwrap();
    wait_for(&importer);
    assert_eq!(importer.status(), ImportStatus::ParsedFailed);
}

#[test]
fn database_is_released_after_drop() {
    let file = SceneFile::document(vec![
        group(&["inst"]),
        instance("inst", "tri", IDENTITY),
        triangle("tri"),
    ]);
    let db = Arc::new(MemoryDatabase::new());
    let config = ImporterConfig {
        worker_threads: 2,
        ..Default::default()
    };
    let importer = EssImporter::initialize(file.path(), db.clone(), config).unwrap();
    assert!(db.context_depth() >= 1);
    wait_for(&importer);
    drop(importer);

    assert_eq!(db.context_depth(), 0);
    assert_eq!(db.registered_job_threads(), 0);
    assert_eq!(db.open_accesses(), 0);
}

#[test]
fn dropping_a_running_import_waits_for_it() {
    let names: Vec<String> = (0..50).map(|i| format!("inst{}", i)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut nodes = vec![group(&name_refs)];
    for (i, name) in names.iter().enumerate() {
        let mesh = format!("tri{}", i);
        nodes.push(instance(name, &mesh, IDENTITY));
        nodes.push(triangle(&mesh));
    }
    let file = SceneFile::document(nodes);
    let db = Arc::new(MemoryDatabase::new());
    let importer = EssImporter::initialize(file.path(), db.clone(), ImporterConfig::default()).unwrap();
    drop(importer);

    assert_eq!(db.context_depth(), 0);
    assert_eq!(db.registered_job_threads(), 0);
}
