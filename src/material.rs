//! Writes the shader graph of a scene material into a dynamic material instance.

mod registry;
mod texture;
mod walker;

pub use registry::*;
pub use texture::*;
pub use walker::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MaterialError {
    #[error("Scene has no material named {0}")]
    MissingMaterial(String),
    #[error("Material {0} has no surface_shader")]
    MissingSurfaceShader(String),
}
