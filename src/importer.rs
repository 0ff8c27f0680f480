//! Background import of a scene file into mesh partitions and instance nodes.

mod build;
mod scan;

pub use build::*;
pub use scan::*;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, OnceLock,
    },
    thread::JoinHandle,
};

use ess_common::{MeshInfo, MeshSection, NodeInfo};
use thiserror::Error;

use crate::{
    config::ImporterConfig,
    mesh::WindingOrders,
    scene_db::{
        ContextGuard, DatabaseError, JobThreadGuard, NodeAccessor, SceneDatabase, SharedContext,
        TableAccessor,
    },
};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Scene file {0:?} does not exist")]
    SourceMissing(PathBuf),
    #[error("Failed to start the import worker: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Scene has no node named {0}")]
    MissingNode(String),
    #[error("Node {0} has no instance_list")]
    MissingInstanceList(String),
    #[error("Failed to create the mesh build pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ImportStatus {
    Idle = 0,
    Running = 1,
    ParsedOk = 2,
    ParsedFailed = 3,
}

impl ImportStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ImportStatus::Running,
            2 => ImportStatus::ParsedOk,
            3 => ImportStatus::ParsedFailed,
            _ => ImportStatus::Idle,
        }
    }
}

/// Winding requirements of a mesh, and its partitions once built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshMapInfo {
    pub winding: WindingOrders,
    pub meshes: Vec<MeshInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct ImportedScene {
    pub nodes: Vec<NodeInfo>,
    pub meshes: HashMap<String, MeshMapInfo>,
}

impl ImportedScene {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_info(&self, index: usize) -> Option<&NodeInfo> {
        self.nodes.get(index)
    }

    pub fn mesh_info(&self, mesh_name: &str) -> Option<&[MeshInfo]> {
        self.meshes
            .get(mesh_name)
            .map(|info| info.meshes.as_slice())
    }

    /// The sections to hand to a mesh component for one instance.
    pub fn sections_for_node<'a>(
        &'a self,
        node: &'a NodeInfo,
    ) -> impl Iterator<Item = MeshSection<'a>> + 'a {
        self.mesh_info(&node.mesh_name)
            .unwrap_or_default()
            .iter()
            .map(|mesh| MeshSection::new(mesh, node.invert_vertex_order))
    }
}

struct ImportShared {
    status: AtomicU8,
    parse_finished: AtomicBool,
    scene: OnceLock<ImportedScene>,
}

/// Imports a scene file on a background thread.
///
/// Poll [`EssImporter::check_parse_finished`] until it returns true, then read the
/// result. Dropping the importer waits for the worker.
pub struct EssImporter {
    path: PathBuf,
    shared: Arc<ImportShared>,
    worker: Option<JoinHandle<()>>,
    _context: SharedContext,
}

impl EssImporter {
    pub fn initialize(
        path: impl AsRef<Path>,
        db: Arc<dyn SceneDatabase>,
        config: ImporterConfig,
    ) -> Result<Self, ImportError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ImportError::SourceMissing(path));
        }

        let context = SharedContext::new(db.clone());
        let shared = Arc::new(ImportShared {
            status: AtomicU8::new(ImportStatus::Idle as u8),
            parse_finished: AtomicBool::new(false),
            scene: OnceLock::new(),
        });

        let worker = {
            let shared = shared.clone();
            let path = path.clone();
            shared.status.store(ImportStatus::Running as u8, Ordering::SeqCst);
            std::thread::Builder::new()
                .name("EssImporter".into())
                .spawn(move || run_worker(db.as_ref(), &path, &config, &shared))
                .map_err(ImportError::Spawn)?
        };

        log::info!("Started importing {:?}", path);
        Ok(Self {
            path,
            shared,
            worker: Some(worker),
            _context: context,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> ImportStatus {
        ImportStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    /// True exactly once, on the first call after the worker finished.
    pub fn check_parse_finished(&self) -> bool {
        self.shared.parse_finished.swap(false, Ordering::AcqRel)
    }

    pub fn parse_result(&self) -> bool {
        self.status() == ImportStatus::ParsedOk
    }

    /// Available once the parse succeeded.
    pub fn scene(&self) -> Option<&ImportedScene> {
        self.shared.scene.get()
    }

    pub fn node_count(&self) -> usize {
        self.scene().map_or(0, ImportedScene::node_count)
    }

    pub fn node_info(&self, index: usize) -> Option<&NodeInfo> {
        self.scene()?.node_info(index)
    }

    pub fn mesh_info(&self, mesh_name: &str) -> Option<&[MeshInfo]> {
        self.scene()?.mesh_info(mesh_name)
    }
}

impl Drop for EssImporter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Import worker for {:?} panicked", self.path);
            }
        }
    }
}

fn run_worker(db: &dyn SceneDatabase, path: &Path, config: &ImporterConfig, shared: &ImportShared) {
    let result = {
        let _job_thread = JobThreadGuard::new(db);
        let _context = ContextGuard::new(db);
        parse_scene(db, path, config)
    };

    let status = match result {
        Ok(scene) => {
            log::info!(
                "Imported {:?}: {} nodes, {} meshes",
                path,
                scene.node_count(),
                scene.meshes.len()
            );
            // Only this thread ever sets the scene.
            let _ = shared.scene.set(scene);
            ImportStatus::ParsedOk
        }
        Err(err) => {
            log::error!("Failed to import {:?}: {}", path, err);
            ImportStatus::ParsedFailed
        }
    };
    shared.status.store(status as u8, Ordering::Release);
    shared.parse_finished.store(true, Ordering::Release);
}

/// Parses the file and runs the whole import on the calling thread.
///
/// The caller needs an open context and has to be registered with the database.
pub fn parse_scene(
    db: &dyn SceneDatabase,
    path: &Path,
    config: &ImporterConfig,
) -> Result<ImportedScene, ImportError> {
    for search_path in &config.shader_search_paths {
        db.add_search_path(search_path);
    }
    db.parse_file(path)?;

    let group_tag = db
        .find_node(&config.instance_group)
        .ok_or_else(|| ImportError::MissingNode(config.instance_group.clone()))?;
    let group = NodeAccessor::new(db, group_tag)
        .ok_or_else(|| ImportError::MissingNode(config.instance_group.clone()))?;
    let instance_list = group
        .array("instance_list")
        .and_then(|tag| TableAccessor::new(db, tag))
        .ok_or_else(|| ImportError::MissingInstanceList(config.instance_group.clone()))?;
    let instances = instance_list
        .tags()
        .ok_or_else(|| ImportError::MissingInstanceList(config.instance_group.clone()))?;

    let mut scene = scan_instances(db, instances, config);
    build_meshes(db, &mut scene.meshes, config.worker_threads)?;
    Ok(scene)
}
