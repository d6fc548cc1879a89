//! Rigid transform helpers.
//!
//! Transforms are plain homogeneous `Matrix4<f32>` values: the upper-left
//! 3×3 block is the rotation (optionally times a uniform scale), the last
//! column holds the translation.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector6};

/// Build a homogeneous matrix from a rotation and a translation.
pub fn rigid_transform(rotation: &Matrix3<f32>, translation: &Vector3<f32>) -> Matrix4<f32> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

pub fn rotation_part(transformation: &Matrix4<f32>) -> Matrix3<f32> {
    transformation.fixed_view::<3, 3>(0, 0).into_owned()
}

pub fn translation_part(transformation: &Matrix4<f32>) -> Vector3<f32> {
    transformation.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Inverse of a rigid transform, `[Rᵀ | -Rᵀ t]`.
pub fn inverse_rigid(transformation: &Matrix4<f32>) -> Matrix4<f32> {
    let r_inv = rotation_part(transformation).transpose();
    let t_inv = -r_inv * translation_part(transformation);
    rigid_transform(&r_inv, &t_inv)
}

/// Geodesic angle (radians) of a rotation matrix.
pub fn rotation_angle(rotation: &Matrix3<f32>) -> f32 {
    let cos = ((rotation.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    cos.acos()
}

/// Rotation angle (radians) and translation norm of `estimate · truth⁻¹`.
pub fn transform_error(estimate: &Matrix4<f32>, truth: &Matrix4<f32>) -> (f32, f32) {
    let delta = estimate * inverse_rigid(truth);
    (
        rotation_angle(&rotation_part(&delta)),
        translation_part(&delta).norm(),
    )
}

/// Rotation of `angle` radians about `axis` (Rodrigues).
pub fn axis_angle_rotation(axis: &Vector3<f32>, angle: f32) -> Matrix3<f32> {
    let norm = axis.norm();
    if norm < 1e-12 {
        return Matrix3::identity();
    }
    let k = skew_symmetric(&(axis / norm));
    Matrix3::identity() + k * angle.sin() + k * k * (1.0 - angle.cos())
}

pub fn skew_symmetric(v: &Vector3<f32>) -> Matrix3<f32> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Exponential map from se(3) to SE(3).
///
/// `delta` is ordered `[v; ω]`: translational part first, rotation vector last.
pub fn exp_se3(delta: &Vector6<f32>) -> Matrix4<f32> {
    let v = Vector3::new(delta[0], delta[1], delta[2]);
    let omega = Vector3::new(delta[3], delta[4], delta[5]);
    let theta = omega.norm();

    if theta < 1e-6 {
        // first order
        let rotation = Matrix3::identity() + skew_symmetric(&omega);
        return rigid_transform(&rotation, &v);
    }

    let k = skew_symmetric(&(omega / theta));
    let k_sq = k * k;
    let rotation = Matrix3::identity() + k * theta.sin() + k_sq * (1.0 - theta.cos());
    let left_jacobian = Matrix3::identity()
        + k * ((1.0 - theta.cos()) / theta)
        + k_sq * ((theta - theta.sin()) / theta);
    rigid_transform(&rotation, &(left_jacobian * v))
}
