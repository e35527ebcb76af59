//! Rotation matrices and Euler angle conversions.
//!
//! Euler angles are `[yaw, pitch, roll]` in degrees with the composition
//! `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.

use nalgebra::{Matrix3, Rotation3, Vector3};

/// Builds `Rz(yaw) * Ry(pitch) * Rx(roll)` from angles in degrees.
pub fn rotation_from_euler_degrees(angles: [f64; 3]) -> Matrix3<f64> {
    let [yaw, pitch, roll] = angles;
    Rotation3::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
        .into_inner()
}

/// Recovers `[yaw, pitch, roll]` in degrees from a proper rotation matrix.
///
/// At gimbal lock (`|pitch| = 90`) the yaw is reported as zero and the whole
/// rotation about the vertical axis is attributed to roll.
pub fn euler_degrees_from_rotation(rotation: &Matrix3<f64>) -> [f64; 3] {
    let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(*rotation).euler_angles();
    [
        wrap_degrees(yaw.to_degrees()),
        wrap_degrees(pitch.to_degrees()),
        wrap_degrees(roll.to_degrees()),
    ]
}

/// Rotation by `angle` radians about the x axis.
pub fn rotation_about_x(angle: f64) -> Matrix3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), angle).into_inner()
}

/// Wraps an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Checks `R^T R = I` and `det R = +1` within `tolerance`.
pub fn is_proper_rotation(matrix: &Matrix3<f64>, tolerance: f64) -> bool {
    let gram = matrix.transpose() * matrix;
    (gram - Matrix3::identity()).amax() <= tolerance && (matrix.determinant() - 1.0).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn yaw_only_rotates_in_xy_plane() {
        let r = rotation_from_euler_degrees([90.0, 0.0, 0.0]);
        let x = r * Vector3::x();
        assert!((x - Vector3::y()).norm() < 1e-12);
        assert!((r * Vector3::z() - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn wrap_keeps_half_open_range() {
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert!((wrap_degrees(370.0) - 10.0).abs() < 1e-12);
        assert!((wrap_degrees(-190.0) - 170.0).abs() < 1e-12);
    }

    #[test]
    fn reflection_is_not_proper() {
        let mut m = Matrix3::identity();
        m[(2, 2)] = -1.0;
        assert!(!is_proper_rotation(&m, 1e-9));
    }

    proptest! {
        #[test]
        fn euler_round_trip(
            yaw in -179.0f64..179.0,
            pitch in -85.0f64..85.0,
            roll in -179.0f64..179.0,
        ) {
            let r = rotation_from_euler_degrees([yaw, pitch, roll]);
            prop_assert!(is_proper_rotation(&r, 1e-9));
            let [y, p, ro] = euler_degrees_from_rotation(&r);
            prop_assert!((y - yaw).abs() < 1e-6);
            prop_assert!((p - pitch).abs() < 1e-6);
            prop_assert!((ro - roll).abs() < 1e-6);
        }
    }
}
