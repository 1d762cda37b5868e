//! Conversions between nalgebra types and their wire representations.

use nalgebra::{Quaternion, UnitQuaternion};

/// Flatten a rotation into the wire ordering `[w, x, y, z]`.
pub fn quaternion_to_wire(q: &UnitQuaternion<f32>) -> [f32; 4] {
    let q = q.quaternion();
    [q.w, q.i, q.j, q.k]
}

/// Rebuild a rotation from `[w, x, y, z]`. The input is renormalized.
pub fn wire_to_quaternion(q: &[f32; 4]) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]))
}
