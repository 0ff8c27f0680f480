use std::{sync::Arc, time::Duration};

use env_logger::Env;
use ess_importer::{
    config::{ConfigFileLoader, ImporterConfig},
    importer::EssImporter,
    scene_db::MemoryDatabase,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        anyhow::bail!("Usage: ess_import <scene.json> [config.json]");
    };
    let config = match args.next() {
        Some(config_path) => ConfigFileLoader::new(config_path).load_config()?.clone(),
        None => ImporterConfig::default(),
    };

    let db = Arc::new(MemoryDatabase::new());
    let importer = EssImporter::initialize(&scene_path, db, config)?;
    while !importer.check_parse_finished() {
        std::thread::sleep(Duration::from_millis(10));
    }

    let Some(scene) = importer.scene() else {
        anyhow::bail!("Failed to import {}", scene_path);
    };

    for node in &scene.nodes {
        println!(
            "{} -> {} (inverted: {}, materials: {:?})",
            node.name, node.mesh_name, node.invert_vertex_order, node.material_names
        );
    }
    let mut mesh_names: Vec<_> = scene.meshes.keys().collect();
    mesh_names.sort();
    for name in mesh_names {
        for mesh in scene.mesh_info(name).unwrap_or_default() {
            println!(
                "{} [material {}]: {} vertices, {} triangles, {} inverted triangles",
                name,
                mesh.material_index,
                mesh.vertex_count(),
                mesh.triangles.len() / 3,
                mesh.invert_triangles.len() / 3
            );
        }
    }
    Ok(())
}
