//! Access to the renderer's scene database.
//!
//! The database is a tagged store of nodes and data tables. Every access is
//! bracketed by an accessor guard, and worker threads have to be registered with
//! the database's job system before they touch it.

mod memory;

pub use memory::*;

use std::{ops::Deref, path::Path, sync::Arc};

use thiserror::Error;

/// Handle of a node or data table inside the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Scalar(f32),
    Bool(bool),
    Index(u32),
    Vector([f32; 3]),
    Color([f32; 4]),
    Token(String),
    Matrix([f32; 16]),
    /// `None` when the referenced node does not exist.
    Node(Option<Tag>),
    /// Fed by output `output` of another shader node.
    Link { node: Option<Tag>, output: u32 },
    Array(Tag),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub unique_name: String,
    /// Name of the node description, for example `instance`, `poly` or a shader type.
    pub desc: String,
    pub params: Vec<Param>,
}

impl SceneNode {
    pub fn find_param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    pub fn array(&self, name: &str) -> Option<Tag> {
        match self.find_param(name)? {
            ParamValue::Array(tag) => Some(*tag),
            _ => None,
        }
    }

    pub fn node(&self, name: &str) -> Option<Tag> {
        match self.find_param(name)? {
            ParamValue::Node(tag) => *tag,
            _ => None,
        }
    }

    pub fn matrix(&self, name: &str) -> Option<[f32; 16]> {
        match self.find_param(name)? {
            ParamValue::Matrix(matrix) => Some(*matrix),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataTable {
    Index(Vec<u32>),
    Vector(Vec<[f32; 3]>),
    /// `None` entries are null tags.
    Tag(Vec<Option<Tag>>),
}

impl DataTable {
    pub fn len(&self) -> usize {
        match self {
            DataTable::Index(v) => v.len(),
            DataTable::Vector(v) => v.len(),
            DataTable::Tag(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self) -> Option<&[u32]> {
        match self {
            DataTable::Index(v) => Some(v),
            _ => None,
        }
    }

    pub fn vectors(&self) -> Option<&[[f32; 3]]> {
        match self {
            DataTable::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn tags(&self) -> Option<&[Option<Tag>]> {
        match self {
            DataTable::Tag(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum DbItem {
    Node(Arc<SceneNode>),
    Table(Arc<DataTable>),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to read scene file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to decode scene file {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("No database context is open")]
    NoContext,
    #[error("Duplicate node name {0}")]
    DuplicateNode(String),
}

pub trait SceneDatabase: Send + Sync {
    fn begin_context(&self);
    fn end_context(&self);

    /// Has to be called by every thread other than the one that opened the context.
    fn register_job_thread(&self);
    fn unregister_job_thread(&self);

    fn add_search_path(&self, path: &Path);
    fn parse_file(&self, path: &Path) -> Result<(), DatabaseError>;

    fn find_node(&self, name: &str) -> Option<Tag>;

    /// Prefer [`NodeAccessor`] and [`TableAccessor`], which pair this with [`SceneDatabase::end_access`].
    fn access(&self, tag: Tag) -> Option<DbItem>;
    fn end_access(&self, tag: Tag);
}

/// Scoped access to a node. The access ends when the accessor is dropped.
pub struct NodeAccessor<'db> {
    db: &'db dyn SceneDatabase,
    tag: Tag,
    node: Arc<SceneNode>,
}

impl<'db> NodeAccessor<'db> {
    pub fn new(db: &'db dyn SceneDatabase, tag: Tag) -> Option<Self> {
        match db.access(tag)? {
            DbItem::Node(node) => Some(Self { db, tag, node }),
            DbItem::Table(_) => {
                db.end_access(tag);
                None
            }
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl Deref for NodeAccessor<'_> {
    type Target = SceneNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl Drop for NodeAccessor<'_> {
    fn drop(&mut self) {
        self.db.end_access(self.tag);
    }
}

/// Scoped access to a data table.
pub struct TableAccessor<'db> {
    db: &'db dyn SceneDatabase,
    tag: Tag,
    table: Arc<DataTable>,
}

impl<'db> TableAccessor<'db> {
    pub fn new(db: &'db dyn SceneDatabase, tag: Tag) -> Option<Self> {
        match db.access(tag)? {
            DbItem::Table(table) => Some(Self { db, tag, table }),
            DbItem::Node(_) => {
                db.end_access(tag);
                None
            }
        }
    }
}

impl Deref for TableAccessor<'_> {
    type Target = DataTable;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl Drop for TableAccessor<'_> {
    fn drop(&mut self) {
        self.db.end_access(self.tag);
    }
}

/// An open database context, closed on drop.
pub struct ContextGuard<'db> {
    db: &'db dyn SceneDatabase,
}

impl<'db> ContextGuard<'db> {
    pub fn new(db: &'db dyn SceneDatabase) -> Self {
        db.begin_context();
        Self { db }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.db.end_context();
    }
}

/// Same as [`ContextGuard`], for a context that lives as long as its owner.
pub struct SharedContext {
    db: Arc<dyn SceneDatabase>,
}

impl SharedContext {
    pub fn new(db: Arc<dyn SceneDatabase>) -> Self {
        db.begin_context();
        Self { db }
    }
}

impl Drop for SharedContext {
    fn drop(&mut self) {
        self.db.end_context();
    }
}

/// Keeps the current thread registered with the database's job system.
pub struct JobThreadGuard<'db> {
    db: &'db dyn SceneDatabase,
}

impl<'db> JobThreadGuard<'db> {
    pub fn new(db: &'db dyn SceneDatabase) -> Self {
        db.register_job_thread();
        Self { db }
    }
}

impl Drop for JobThreadGuard<'_> {
    fn drop(&mut self) {
        self.db.unregister_job_thread();
    }
}
