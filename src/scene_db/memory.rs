use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{DataTable, DatabaseError, DbItem, Param, ParamValue, SceneDatabase, SceneNode, Tag};

/// Serialized form of a scene, as read by [`MemoryDatabase::parse_file`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    pub nodes: Vec<NodeDocument>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDocument {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub params: Vec<ParamDocument>,
}

impl NodeDocument {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            params: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: ValueDocument) -> Self {
        self.params.push(ParamDocument {
            name: name.into(),
            value,
        });
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamDocument {
    pub name: String,
    pub value: ValueDocument,
}

/// Node references are written as node names.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueDocument {
    Int(i32),
    Scalar(f32),
    Bool(bool),
    Index(u32),
    Vector([f32; 3]),
    Color([f32; 4]),
    Token(String),
    Matrix([f32; 16]),
    Node(String),
    Link { node: String, output: u32 },
    IndexArray(Vec<u32>),
    VectorArray(Vec<[f32; 3]>),
    NodeArray(Vec<String>),
}

#[derive(Default)]
struct Store {
    items: Vec<DbItem>,
    names: HashMap<String, Tag>,
    search_paths: Vec<PathBuf>,
}

impl Store {
    fn push(&mut self, item: DbItem) -> Tag {
        self.items.push(item);
        Tag(self.items.len() as u32)
    }

    fn get(&self, tag: Tag) -> Option<&DbItem> {
        let index = (tag.0 as usize).checked_sub(1)?;
        self.items.get(index)
    }
}

/// A scene database held in memory, filled from JSON scene documents.
#[derive(Default)]
pub struct MemoryDatabase {
    store: RwLock<Store>,
    context_depth: AtomicUsize,
    job_threads: AtomicUsize,
    open_accesses: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: &SceneDocument) -> Result<Self, DatabaseError> {
        let database = Self::new();
        database.load_document(document)?;
        Ok(database)
    }

    pub fn load_document(&self, document: &SceneDocument) -> Result<(), DatabaseError> {
        let mut store = self.store.write();

        // Names first, so that nodes can reference nodes declared after them.
        let first_tag = store.items.len() as u32 + 1;
        let mut pending = HashMap::new();
        for (i, node) in document.nodes.iter().enumerate() {
            if store.names.contains_key(&node.name) || pending.contains_key(&node.name) {
                return Err(DatabaseError::DuplicateNode(node.name.clone()));
            }
            pending.insert(node.name.clone(), Tag(first_tag + i as u32));
        }
        // Reserve the node slots, tables are appended behind them.
        for node in &document.nodes {
            store.items.push(DbItem::Node(Arc::new(SceneNode {
                unique_name: node.name.clone(),
                desc: node.desc.clone(),
                params: Vec::new(),
            })));
        }
        store.names.extend(pending);

        for (i, node) in document.nodes.iter().enumerate() {
            let mut params = Vec::with_capacity(node.params.len());
            for param in &node.params {
                let value = convert_value(&mut store, &param.value);
                params.push(Param {
                    name: param.name.clone(),
                    value,
                });
            }
            store.items[(first_tag as usize - 1) + i] = DbItem::Node(Arc::new(SceneNode {
                unique_name: node.name.clone(),
                desc: node.desc.clone(),
                params,
            }));
        }

        log::debug!(
            "Loaded {} nodes, database now holds {} items",
            document.nodes.len(),
            store.items.len()
        );
        Ok(())
    }

    pub fn context_depth(&self) -> usize {
        self.context_depth.load(Ordering::SeqCst)
    }

    pub fn registered_job_threads(&self) -> usize {
        self.job_threads.load(Ordering::SeqCst)
    }

    /// Number of accessors that have not been released yet.
    pub fn open_accesses(&self) -> usize {
        self.open_accesses.load(Ordering::SeqCst)
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.store.read().search_paths.clone()
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        self.store
            .read()
            .search_paths
            .iter()
            .map(|search_path| search_path.join(path))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| path.to_path_buf())
    }
}

fn convert_value(store: &mut Store, value: &ValueDocument) -> ParamValue {
    match value {
        ValueDocument::Int(v) => ParamValue::Int(*v),
        ValueDocument::Scalar(v) => ParamValue::Scalar(*v),
        ValueDocument::Bool(v) => ParamValue::Bool(*v),
        ValueDocument::Index(v) => ParamValue::Index(*v),
        ValueDocument::Vector(v) => ParamValue::Vector(*v),
        ValueDocument::Color(v) => ParamValue::Color(*v),
        ValueDocument::Token(v) => ParamValue::Token(v.clone()),
        ValueDocument::Matrix(v) => ParamValue::Matrix(*v),
        ValueDocument::Node(name) => ParamValue::Node(store.names.get(name).copied()),
        ValueDocument::Link { node, output } => ParamValue::Link {
            node: store.names.get(node).copied(),
            output: *output,
        },
        ValueDocument::IndexArray(v) => {
            ParamValue::Array(store.push(DbItem::Table(Arc::new(DataTable::Index(v.clone())))))
        }
        ValueDocument::VectorArray(v) => {
            ParamValue::Array(store.push(DbItem::Table(Arc::new(DataTable::Vector(v.clone())))))
        }
        ValueDocument::NodeArray(names) => {
            let tags = names
                .iter()
                .map(|name| store.names.get(name).copied())
                .collect();
            ParamValue::Array(store.push(DbItem::Table(Arc::new(DataTable::Tag(tags)))))
        }
    }
}

impl SceneDatabase for MemoryDatabase {
    fn begin_context(&self) {
        self.context_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn end_context(&self) {
        let previous = self.context_depth.fetch_sub(1, Ordering::SeqCst);
        if previous == 0 {
            log::error!("Database context closed more often than it was opened");
            self.context_depth.store(0, Ordering::SeqCst);
        }
    }

    fn register_job_thread(&self) {
        self.job_threads.fetch_add(1, Ordering::SeqCst);
    }

    fn unregister_job_thread(&self) {
        self.job_threads.fetch_sub(1, Ordering::SeqCst);
    }

    fn add_search_path(&self, path: &Path) {
        self.store.write().search_paths.push(path.to_path_buf());
    }

    fn parse_file(&self, path: &Path) -> Result<(), DatabaseError> {
        if self.context_depth() == 0 {
            return Err(DatabaseError::NoContext);
        }
        let path = self.resolve_path(path);
        let content = std::fs::read_to_string(&path).map_err(|source| DatabaseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let document: SceneDocument =
            serde_json::from_str(&content).map_err(|source| DatabaseError::Decode {
                path: path.display().to_string(),
                source,
            })?;
        self.load_document(&document)
    }

    fn find_node(&self, name: &str) -> Option<Tag> {
        self.store.read().names.get(name).copied()
    }

    fn access(&self, tag: Tag) -> Option<DbItem> {
        let item = self.store.read().get(tag).cloned()?;
        self.open_accesses.fetch_add(1, Ordering::SeqCst);
        Some(item)
    }

    fn end_access(&self, _tag: Tag) {
        self.open_accesses.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_db::{NodeAccessor, TableAccessor};

    fn document() -> SceneDocument {
        SceneDocument {
            nodes: vec![
                NodeDocument::new("inst", "instance")
                    .with("element", ValueDocument::Node("mesh".into())),
                NodeDocument::new("mesh", "poly")
                    .with("triangle_list", ValueDocument::IndexArray(vec![0, 1, 2])),
            ],
        }
    }

    #[test]
    fn forward_node_references_resolve() {
        let db = MemoryDatabase::from_document(&document()).unwrap();
        let inst = NodeAccessor::new(&db, db.find_node("inst").unwrap()).unwrap();
        assert_eq!(inst.node("element"), db.find_node("mesh"));
    }

    #[test]
    fn accessors_release_on_drop() {
        let db = MemoryDatabase::from_document(&document()).unwrap();
        {
            let mesh = NodeAccessor::new(&db, db.find_node("mesh").unwrap()).unwrap();
            let table = TableAccessor::new(&db, mesh.array("triangle_list").unwrap()).unwrap();
            assert_eq!(table.indices(), Some(&[0, 1, 2][..]));
            assert_eq!(db.open_accesses(), 2);
        }
        assert_eq!(db.open_accesses(), 0);
    }

    #[test]
    fn accessing_a_table_as_a_node_fails_without_leaking() {
        let db = MemoryDatabase::from_document(&document()).unwrap();
        let table_tag = {
            let mesh = NodeAccessor::new(&db, db.find_node("mesh").unwrap()).unwrap();
            mesh.array("triangle_list").unwrap()
        };
        assert!(NodeAccessor::new(&db, table_tag).is_none());
        assert_eq!(db.open_accesses(), 0);
    }

    #[test]
    fn unknown_references_become_null() {
        let db = MemoryDatabase::from_document(&SceneDocument {
            nodes: vec![NodeDocument::new("inst", "instance")
                .with("element", ValueDocument::Node("missing".into()))],
        })
        .unwrap();
        let inst = NodeAccessor::new(&db, db.find_node("inst").unwrap()).unwrap();
        assert_eq!(inst.find_param("element"), Some(&ParamValue::Node(None)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = MemoryDatabase::from_document(&SceneDocument {
            nodes: vec![
                NodeDocument::new("a", "poly"),
                NodeDocument::new("a", "poly"),
            ],
        });
        assert!(matches!(result, Err(DatabaseError::DuplicateNode(_))));
    }

    #[test]
    fn parse_requires_a_context() {
        let db = MemoryDatabase::new();
        let result = db.parse_file(Path::new("does-not-matter.json"));
        assert!(matches!(result, Err(DatabaseError::NoContext)));
    }

    #[test]
    fn document_json_shape() {
        let json = r#"{"nodes":[{"name":"m","desc":"poly","params":[
            {"name":"pos_list","value":{"type":"vector_array","value":[[0,0,0]]}}]}]}"#;
        let document: SceneDocument = serde_json::from_str(json).unwrap();
        assert!(matches!(
            document.nodes[0].params[0].value,
            ValueDocument::VectorArray(_)
        ));
    }
}
