//! 3x3 picture transforms.

use serde::{Deserialize, Serialize};

/// Row-major projective transform mapping destination-relative coordinates into source space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub matrix: [[f32; 3]; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    #[cfg(test)]
    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            matrix: [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]],
        }
    }

    #[cfg(test)]
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            matrix: [[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn is_affine(&self) -> bool {
        self.matrix[2] == [0.0, 0.0, 1.0]
    }

    /// Returns the offset when the transform is a pure integer translation.
    pub fn integer_translation(&self) -> Option<(i32, i32)> {
        let m = &self.matrix;
        if m[0][0] != 1.0 || m[0][1] != 0.0 || m[1][0] != 0.0 || m[1][1] != 1.0 {
            return None;
        }
        if !self.is_affine() {
            return None;
        }
        if m[0][2].fract() != 0.0 || m[1][2].fract() != 0.0 {
            return None;
        }
        Some((m[0][2] as i32, m[1][2] as i32))
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Maps a point through the full projective matrix, returning homogeneous `(u, v, w)`.
    ///
    /// `None` when the point maps to infinity.
    pub fn map_point_3d(&self, x: f32, y: f32) -> Option<(f32, f32, f32)> {
        let m = &self.matrix;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w == 0.0 {
            return None;
        }
        let (u, v) = self.map_point(x, y);
        Some((u, v, w))
    }
}

/// Maps `(x, y)` through an optional affine transform.
pub fn transform_point(transform: Option<&Transform>, x: f32, y: f32) -> (f32, f32) {
    match transform {
        Some(t) => t.map_point(x, y),
        None => (x, y),
    }
}

/// Maps `(x, y)` through an optional projective transform.
pub fn transform_point_3d(transform: Option<&Transform>, x: f32, y: f32) -> Option<(f32, f32, f32)> {
    match transform {
        Some(t) => t.map_point_3d(x, y),
        None => Some((x, y, 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_translation_detection() {
        assert_eq!(Transform::identity().integer_translation(), Some((0, 0)));
        assert_eq!(Transform::translate(3.0, -4.0).integer_translation(), Some((3, -4)));
        assert_eq!(Transform::translate(0.5, 0.0).integer_translation(), None);
        assert_eq!(Transform::scale(2.0, 2.0).integer_translation(), None);
    }

    #[test]
    fn projective_points() {
        let mut t = Transform::identity();
        t.matrix[2] = [0.0, 0.0, 2.0];
        assert!(!t.is_affine());
        assert_eq!(t.map_point_3d(4.0, 6.0), Some((4.0, 6.0, 2.0)));

        t.matrix[2] = [1.0, 0.0, 0.0];
        assert_eq!(t.map_point_3d(0.0, 5.0), None);
    }

    #[test]
    fn absent_transform_is_identity() {
        assert_eq!(transform_point(None, 1.5, 2.5), (1.5, 2.5));
        let scale = Transform::scale(2.0, 3.0);
        assert_eq!(transform_point(Some(&scale), 1.0, 1.0), (2.0, 3.0));
        assert_eq!(transform_point_3d(None, 1.0, 2.0), Some((1.0, 2.0, 1.0)));
    }
}
