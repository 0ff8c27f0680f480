use serde::{Deserialize, Serialize};
use ultraviolet::{Mat4, Vec4};

/// World transform of an instance, stored the way the scene database lays it out:
/// `rows[i]` of the source matrix becomes column `i` here.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NodeTransform {
    pub matrix: Mat4,
}

impl NodeTransform {
    pub fn from_row_major(values: [f32; 16]) -> Self {
        let column = |i: usize| {
            Vec4::new(
                values[i * 4],
                values[i * 4 + 1],
                values[i * 4 + 2],
                values[i * 4 + 3],
            )
        };
        Self {
            matrix: Mat4::new(column(0), column(1), column(2), column(3)),
        }
    }

    pub fn determinant(&self) -> f32 {
        self.matrix.determinant()
    }

    /// Negative scale flips the triangle winding.
    pub fn is_mirrored(&self) -> bool {
        self.determinant() < 0.0
    }

    /// Converts from the scene database's coordinate convention by negating the Y
    /// component of every basis vector and of the translation.
    pub fn flip_y_axis(&mut self) {
        for column in self.matrix.cols.iter_mut() {
            column.y = -column.y;
        }
    }

    pub fn translation(&self) -> [f32; 3] {
        let w = self.matrix.cols[3];
        [w.x, w.y, w.z]
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            matrix: Mat4::identity(),
        }
    }
}

impl From<NodeTransform> for Mat4 {
    fn from(transform: NodeTransform) -> Self {
        transform.matrix
    }
}
