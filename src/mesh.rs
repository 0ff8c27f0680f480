mod builder;
mod parser;
mod vertex_key;

pub use builder::*;
pub use parser::*;
pub use vertex_key::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MeshError {
    #[error("Mesh is missing the required array {0}")]
    MissingArray(&'static str),
    #[error("Array {0} has an unexpected element type")]
    WrongArrayType(&'static str),
    #[error("Index {index} is out of range for {array} with {len} elements")]
    IndexOutOfRange {
        array: &'static str,
        index: usize,
        len: usize,
    },
}
