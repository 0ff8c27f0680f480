//! Imports ESS scene descriptions: instance nodes, welded mesh partitions per material,
//! material parameter blocks and the shader fragment dispatcher that renders them.

pub mod config;
pub mod fragment;
pub mod importer;
pub mod material;
pub mod mesh;
pub mod scene_db;
pub mod shader_types;

pub use ess_common;
