//! 4x4 transform matrix
//!
//! Column-major, like OpenGL. Every builder post-multiplies, so
//! `identity().rotate_z(a).ortho(..).scale(..)` reads in the same order
//! as the glRotate/glOrtho/glScale call sequence it replaces.

/// Column-major 4x4 matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    m: [f32; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub const fn identity() -> Self {
        Self {
            m: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    /// Element at `row`, `col`
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.m[col * 4 + row]
    }

    /// `self * rhs`
    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| self.get(row, k) * rhs.get(k, col)).sum();
            }
        }
        Mat4 { m: out }
    }

    /// Rotate about Z by `degrees` (counter-clockwise)
    pub fn rotate_z(&self, degrees: f32) -> Mat4 {
        let (s, c) = degrees.to_radians().sin_cos();
        // Snap so right-angle turns stay exact
        let snap = |v: f32| if v.abs() < 1e-6 { 0.0 } else { v };
        let (s, c) = (snap(s), snap(c));
        let r = Mat4 {
            m: [
                c, s, 0.0, 0.0, //
                -s, c, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        };
        self.mul(&r)
    }

    /// Orthographic projection, glOrtho semantics
    pub fn ortho(&self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let o = Mat4 {
            m: [
                2.0 / (right - left),
                0.0,
                0.0,
                0.0,
                0.0,
                2.0 / (top - bottom),
                0.0,
                0.0,
                0.0,
                0.0,
                -2.0 / (far - near),
                0.0,
                -(right + left) / (right - left),
                -(top + bottom) / (top - bottom),
                -(far + near) / (far - near),
                1.0,
            ],
        };
        self.mul(&o)
    }

    pub fn scale(&self, sx: f32, sy: f32, sz: f32) -> Mat4 {
        let s = Mat4 {
            m: [
                sx, 0.0, 0.0, 0.0, //
                0.0, sy, 0.0, 0.0, //
                0.0, 0.0, sz, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        };
        self.mul(&s)
    }

    /// Transform a point (w = 1), returning x, y
    #[allow(dead_code)]
    pub fn transform_point(&self, x: f32, y: f32, z: f32) -> (f32, f32) {
        let v = [x, y, z, 1.0];
        let tx: f32 = (0..4).map(|k| self.get(0, k) * v[k]).sum();
        let ty: f32 = (0..4).map(|k| self.get(1, k) * v[k]).sum();
        (tx, ty)
    }

    /// Raw column-major storage for `glUniformMatrix4fv`
    pub fn as_array(&self) -> &[f32; 16] {
        &self.m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-5 && (a.1 - b.1).abs() < 1e-5
    }

    #[test]
    fn test_rotate_z_quarter_turn() {
        let m = Mat4::identity().rotate_z(90.0);
        assert!(close(m.transform_point(1.0, 0.0, 0.0), (0.0, 1.0)));
        assert!(close(m.transform_point(0.0, 1.0, 0.0), (-1.0, 0.0)));
    }

    #[test]
    fn test_rotate_full_turn_is_identity() {
        let m = Mat4::identity().rotate_z(180.0).rotate_z(180.0);
        assert_eq!(m, Mat4::identity());
    }

    #[test]
    fn test_ortho_maps_half_unit_quad_to_ndc() {
        // Top and bottom swapped: y is flipped
        let m = Mat4::identity().ortho(-0.5, 0.5, 0.5, -0.5, -1.0, 1.0);
        assert!(close(m.transform_point(0.5, 0.5, 0.0), (1.0, -1.0)));
        assert!(close(m.transform_point(-0.5, -0.5, 0.0), (-1.0, 1.0)));
    }

    #[test]
    fn test_scale_then_transform() {
        let m = Mat4::identity().scale(2.0, 0.5, 0.0);
        assert!(close(m.transform_point(1.0, 1.0, 7.0), (2.0, 0.5)));
    }

    #[test]
    fn test_post_multiply_order() {
        // rotate, then scale: the scale hits the vertex first
        let m = Mat4::identity().rotate_z(90.0).scale(2.0, 1.0, 1.0);
        assert!(close(m.transform_point(1.0, 0.0, 0.0), (0.0, 2.0)));
    }
}
