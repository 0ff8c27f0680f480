mod mesh;
mod node;
pub mod transform;

pub use mesh::*;
pub use node::*;
