//! A material expression that merges shader fragments into one dispatching shader function.
//!
//! Every fragment implements one shader type. Its leading declaration lists the parameters,
//! each followed by a `/* ... */` comment with numeric defaults:
//!
//! ```text
//! void max_mix(in float3 color1 /* 0, 0, 0 */, float amount /* 0.5 */, out float4 result /* 0 */)
//! // START FUNCTION BODY
//! void max_mix(float4 color1, float amount, out float4 result) { ... }
//! ```
//!
//! Everything before `START FUNCTION BODY` is emitted once as external code. Everything
//! after it becomes a member of the generated `Functions` struct. The node creates one
//! material parameter per fragment parameter and instance slot, and the generated code
//! calls the fragments in the order given by the `ess_nodeID*` inputs.

mod editor;
mod node;
mod parser;
mod translator;

pub use editor::*;
pub use node::*;
pub use parser::*;
pub use translator::*;

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Horizontal distance between generated parameter nodes.
pub const UI_DELTA_X: f32 = 125.0;
pub const UI_DELTA_Y: f32 = 50.0;

pub const START_FUNCTION_BODY: &str = "START FUNCTION BODY";

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("There is no input shader {0}")]
    NoSuchShader(usize),
    #[error("Failed to read shader fragment {path:?}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid fragment pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Shader fragment {0:?} has no declaration with defaults")]
    NoDeclaration(PathBuf),
    #[error("Unknown shader type {0}")]
    UnknownShaderType(String),
    #[error("Shader type {0} is already provided by another fragment")]
    DuplicateShaderType(String),
}

/// One configured shader fragment, and what was generated from it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputShaderInfo {
    pub shader_file_path: PathBuf,
    /// How many nodes of this type a material can use.
    pub max_shader_count: u32,
    pub shader_type: String,
    pub parameter_declaration: String,
    pub shader_function_body: String,
    pub texture_parameters: Vec<String>,
}

impl InputShaderInfo {
    pub fn new(path: impl Into<PathBuf>, max_shader_count: u32) -> Self {
        Self {
            shader_file_path: path.into(),
            max_shader_count,
            ..Default::default()
        }
    }

    /// Whether the user facing settings match. Generated fields are ignored.
    pub fn same_source(&self, other: &InputShaderInfo) -> bool {
        self.shader_file_path == other.shader_file_path
            && self.max_shader_count == other.max_shader_count
    }

    /// Reads the fragment file. If it is gone, a file with the same name under the
    /// fallback directory is read instead.
    ///
    /// Returns the source and the path it was read from.
    pub fn load_source(&self, fallback_dir: Option<&Path>) -> Result<(String, PathBuf), FragmentError> {
        let error = match std::fs::read_to_string(&self.shader_file_path) {
            Ok(source) => return Ok((source, self.shader_file_path.clone())),
            Err(error) => error,
        };

        let fallback = fallback_dir
            .zip(self.shader_file_path.file_name())
            .and_then(|(dir, file_name)| find_file(dir, file_name));
        let Some(fallback) = fallback else {
            return Err(FragmentError::Load {
                path: self.shader_file_path.clone(),
                source: error,
            });
        };

        let source = std::fs::read_to_string(&fallback).map_err(|source| FragmentError::Load {
            path: fallback.clone(),
            source,
        })?;
        log::info!(
            "Shader fragment {:?} not found, using {:?}",
            self.shader_file_path,
            fallback
        );
        Ok((source, fallback))
    }
}

fn find_file(dir: &Path, file_name: &std::ffi::OsStr) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
        .map(|entry| entry.into_path())
}

/// Splits a fragment into its external code and its function body.
///
/// The external code keeps the marker line up to the marker, followed by a newline.
pub fn split_fragment(source: &str) -> Option<(String, &str)> {
    let body_start = source.find(START_FUNCTION_BODY)? + START_FUNCTION_BODY.len();
    let external = format!("{}\n", &source[..body_start]);
    Some((external, &source[body_start..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_marker() {
        let (external, body) = split_fragment("#include \"a\"\n// START FUNCTION BODY\nvoid f() {}\n").unwrap();
        assert_eq!(external, "#include \"a\"\n// START FUNCTION BODY\n");
        assert_eq!(body, "\nvoid f() {}\n");
        assert!(split_fragment("void f() {}").is_none());
    }

    #[test]
    fn same_source_ignores_generated_fields() {
        let a = InputShaderInfo::new("a.hlsl", 2);
        let mut b = a.clone();
        b.shader_type = "max_mix".into();
        assert!(a.same_source(&b));
        b.max_shader_count = 3;
        assert!(!a.same_source(&b));
    }

    #[test]
    fn falls_back_to_file_with_same_name() {
        let dir = std::env::temp_dir().join(format!("ess-fragments-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("mix.hlsl"), "fragment").unwrap();

        let info = InputShaderInfo::new("/nowhere/mix.hlsl", 1);
        assert!(matches!(
            info.load_source(None),
            Err(FragmentError::Load { .. })
        ));
        let (source, path) = info.load_source(Some(&dir)).unwrap();
        assert_eq!(source, "fragment");
        assert_eq!(path, dir.join("nested").join("mix.hlsl"));
        assert_eq!(info.shader_file_path, PathBuf::from("/nowhere/mix.hlsl"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
