//! Transform helpers used when flattening scene graphs

use glam::{Mat3, Mat4, Vec3};

/// Accumulated world transform of a scene node.
///
/// Wraps the full 4x4 matrix together with its upper-left 3x3 block, which
/// is what directions (normals, tangents, light directions) are multiplied
/// by. The 3x3 block is computed once per node instead of once per vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    matrix: Mat4,
    linear: Mat3,
}

impl NodeTransform {
    pub const IDENTITY: Self = Self {
        matrix: Mat4::IDENTITY,
        linear: Mat3::IDENTITY,
    };

    /// Wrap an existing world matrix
    pub fn new(matrix: Mat4) -> Self {
        Self {
            matrix,
            linear: Mat3::from_mat4(matrix),
        }
    }

    /// Compose this (parent) transform with a child's local matrix.
    /// The result is `parent * local`.
    pub fn then(&self, local: Mat4) -> Self {
        Self::new(self.matrix * local)
    }

    /// The full 4x4 world matrix
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// The rotational/scale part only
    pub fn linear(&self) -> Mat3 {
        self.linear
    }

    /// Transform a point, see [`transform_point`]
    pub fn point(&self, p: Vec3) -> Vec3 {
        transform_point(&self.matrix, p)
    }

    /// Transform a direction, see [`transform_direction`]
    pub fn direction(&self, d: Vec3, fallback: Vec3) -> Vec3 {
        let v = self.linear * d;
        v.normalize_or(fallback)
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for NodeTransform {
    fn from(matrix: Mat4) -> Self {
        Self::new(matrix)
    }
}

/// Transform a point by a full 4x4 matrix, applying the homogeneous divide.
///
/// A zero `w` (a degenerate projective matrix) leaves the xyz result as is.
pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    let v = *m * p.extend(1.0);
    if v.w != 0.0 && v.w != 1.0 {
        v.truncate() / v.w
    } else {
        v.truncate()
    }
}

/// Transform a direction by the upper-left 3x3 of `m` and renormalize.
///
/// Returns `fallback` when the transformed vector has zero (or non-finite)
/// length, e.g. for a zero-scale node.
pub fn transform_direction(m: &Mat4, d: Vec3, fallback: Vec3) -> Vec3 {
    (Mat3::from_mat4(*m) * d).normalize_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_point_translation() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform_point(&m, Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_point_homogeneous_divide() {
        let mut m = Mat4::IDENTITY;
        m.w_axis.w = 2.0;
        let p = transform_point(&m, Vec3::new(2.0, 4.0, 6.0));
        assert!((p - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_direction_ignores_translation_and_renormalizes() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
        );
        let d = transform_direction(&m, Vec3::X, Vec3::Z);
        assert!((d - Vec3::Y).length() < 1e-5);
        assert!((d.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_direction_zero_scale_uses_fallback() {
        let m = Mat4::from_scale(Vec3::ZERO);
        assert_eq!(transform_direction(&m, Vec3::X, Vec3::Z), Vec3::Z);
    }

    #[test]
    fn test_node_transform_composition() {
        let parent = NodeTransform::new(Mat4::from_translation(Vec3::X));
        let child = parent.then(Mat4::from_translation(Vec3::Y));
        assert_eq!(child.point(Vec3::ZERO), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(NodeTransform::default(), NodeTransform::IDENTITY);
    }
}
