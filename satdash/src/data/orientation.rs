//! Orientation
//!
//! The latest gyroscope attitude drives the 3D view. The view keeps a
//! canonical base mesh and rotates it from scratch every tick, so the
//! transform here is absolute, never an increment on the previous frame.

use super::decode::Attitude;

/// Most recently decoded attitude, in degrees.
/// `angle_x` is yaw, `angle_y` is pitch, `angle_z` is roll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub angle_x: f64,
    pub angle_y: f64,
    pub angle_z: f64,
}

impl From<Attitude> for Orientation {
    fn from(att: Attitude) -> Self {
        Orientation {
            angle_x: att.yaw,
            angle_y: att.pitch,
            angle_z: att.roll,
        }
    }
}

/// Rotation to apply to the base mesh. Row-major 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTransform {
    pub rotation: [[f64; 3]; 3],
}

impl Default for MeshTransform {
    fn default() -> Self {
        MeshTransform::identity()
    }
}

fn rot_x(deg: f64) -> [[f64; 3]; 3] {
    let (s, c) = deg.to_radians().sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

fn rot_y(deg: f64) -> [[f64; 3]; 3] {
    let (s, c) = deg.to_radians().sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

fn rot_z(deg: f64) -> [[f64; 3]; 3] {
    let (s, c) = deg.to_radians().sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

impl MeshTransform {
    pub fn identity() -> MeshTransform {
        MeshTransform {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Rotation about X by pitch, then Y by yaw, then Z by roll, composed
    /// as `Rx * Ry * Rz` (each rotation premultiplied onto the transform).
    pub fn from_orientation(o: &Orientation) -> MeshTransform {
        let rx = rot_x(o.angle_y);
        let ry = rot_y(o.angle_x);
        let rz = rot_z(o.angle_z);
        MeshTransform {
            rotation: mul(&mul(&rx, &ry), &rz),
        }
    }

    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.rotation;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2],
        ]
    }

    /// Transforms every vertex of the base mesh.
    pub fn apply_all(&self, base: &[[f64; 3]]) -> Vec<[f64; 3]> {
        base.iter().map(|&p| self.apply(p)).collect()
    }
}
