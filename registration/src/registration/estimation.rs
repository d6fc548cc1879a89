use cv_core::point_cloud::PointCloud;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Closed-form point-to-point alignment (Umeyama, 1991).
///
/// With `with_scaling` the upper 3×3 block of the estimate is `s·R`;
/// otherwise the transform is rigid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformationEstimationPointToPoint {
    pub with_scaling: bool,
}

impl TransformationEstimationPointToPoint {
    pub fn new(with_scaling: bool) -> Self {
        Self { with_scaling }
    }

    /// RMSE of `source[i]` against `target[j]` over the given pairs.
    pub fn compute_rmse(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        correspondences: &[(usize, usize)],
    ) -> f32 {
        if correspondences.is_empty() {
            return 0.0;
        }
        let sum: f64 = correspondences
            .iter()
            .map(|&(i, j)| (source.points[i] - target.points[j]).norm_squared() as f64)
            .sum();
        (sum / correspondences.len() as f64).sqrt() as f32
    }

    /// Transform minimizing squared distances between corresponding points.
    ///
    /// Fewer than 3 pairs or a degenerate configuration yield the identity.
    pub fn compute_transformation(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        correspondences: &[(usize, usize)],
    ) -> Matrix4<f32> {
        let pairs: Vec<(Point3<f32>, Point3<f32>)> = correspondences
            .iter()
            .map(|&(i, j)| (source.points[i], target.points[j]))
            .collect();
        self.estimate(&pairs).unwrap_or_else(Matrix4::identity)
    }

    /// Umeyama estimate over explicit `(source, target)` pairs, `None` when
    /// the pairs do not pin down a transform.
    pub fn estimate(&self, pairs: &[(Point3<f32>, Point3<f32>)]) -> Option<Matrix4<f32>> {
        if pairs.len() < 3 {
            return None;
        }
        let n = pairs.len() as f64;

        // Compute centroids
        let mut source_centroid = Vector3::<f64>::zeros();
        let mut target_centroid = Vector3::<f64>::zeros();
        for (s, t) in pairs {
            source_centroid += s.coords.cast::<f64>();
            target_centroid += t.coords.cast::<f64>();
        }
        source_centroid /= n;
        target_centroid /= n;

        // Compute covariance matrix
        let mut covariance = Matrix3::<f64>::zeros();
        let mut source_variance = 0.0;
        for (s, t) in pairs {
            let src = s.coords.cast::<f64>() - source_centroid;
            let tgt = t.coords.cast::<f64>() - target_centroid;
            covariance += tgt * src.transpose();
            source_variance += src.norm_squared();
        }
        covariance /= n;
        source_variance /= n;

        if source_variance < 1e-12 {
            return None;
        }

        // SVD to find rotation
        let svd = covariance.svd(true, true);
        let u = svd.u?;
        let vt = svd.v_t?;
        let mut singular = svd.singular_values;
        if singular.max() < 1e-12 {
            return None;
        }

        // Ensure proper rotation (det = 1)
        let mut u_corrected = u;
        if (u * vt).determinant() < 0.0 {
            let weakest = singular.imin();
            u_corrected.set_column(weakest, &(u.column(weakest) * -1.0));
            singular[weakest] = -singular[weakest];
        }
        let rotation = u_corrected * vt;

        let scale = if self.with_scaling {
            singular.sum() / source_variance
        } else {
            1.0
        };
        let linear = rotation * scale;
        let translation = target_centroid - linear * source_centroid;

        let mut transformation = Matrix4::identity();
        transformation
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&linear.cast::<f32>());
        transformation
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&translation.cast::<f32>());
        Some(transformation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::{axis_angle_rotation, rigid_transform};

    fn tetra() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn test_recovers_rigid_transform() {
        let truth = rigid_transform(
            &axis_angle_rotation(&Vector3::new(1.0, 2.0, -0.5), 1.1),
            &Vector3::new(0.5, -1.0, 2.0),
        );
        let pairs: Vec<_> = tetra()
            .into_iter()
            .map(|p| (p, truth.transform_point(&p)))
            .collect();

        let est = TransformationEstimationPointToPoint::default()
            .estimate(&pairs)
            .unwrap();
        assert_relative_eq!(est, truth, epsilon = 1e-4);
    }

    #[test]
    fn test_reflection_is_corrected() {
        // mirrored target: best proper rotation must still have det = +1
        let pairs: Vec<_> = tetra()
            .into_iter()
            .map(|p| (p, Point3::new(-p.x, p.y, p.z)))
            .collect();
        let est = TransformationEstimationPointToPoint::default()
            .estimate(&pairs)
            .unwrap();
        let r = est.fixed_view::<3, 3>(0, 0).into_owned();
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_scaling() {
        let pairs: Vec<_> = tetra()
            .into_iter()
            .map(|p| (p, Point3::from(p.coords * 2.5 + Vector3::new(1.0, 0.0, 0.0))))
            .collect();

        let rigid = TransformationEstimationPointToPoint::new(false)
            .estimate(&pairs)
            .unwrap();
        assert_relative_eq!(rigid[(0, 0)], 1.0, epsilon = 1e-4);

        let scaled = TransformationEstimationPointToPoint::new(true)
            .estimate(&pairs)
            .unwrap();
        assert_relative_eq!(scaled[(0, 0)], 2.5, epsilon = 1e-4);
        assert_relative_eq!(scaled[(0, 3)], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_input_gives_identity() {
        let est = TransformationEstimationPointToPoint::default();
        let two = vec![(Point3::origin(), Point3::new(1.0, 0.0, 0.0)); 2];
        assert!(est.estimate(&two).is_none());

        let same = vec![(Point3::new(1.0, 1.0, 1.0), Point3::origin()); 5];
        assert!(est.estimate(&same).is_none());

        let pc = PointCloud::new(tetra());
        assert_eq!(est.compute_transformation(&pc, &pc, &[(0, 0)]), Matrix4::identity());
        assert_eq!(est.compute_rmse(&pc, &pc, &[]), 0.0);
        assert_relative_eq!(est.compute_rmse(&pc, &pc, &[(0, 1)]), 1.0);
    }
}
