//! Fast Global Registration (Zhou, Park, Koltun, ECCV 2016).
//!
//! Instead of sampling hypotheses, FGR optimizes a single robust objective
//! over all feature correspondences: a Geman-McClure penalty written as a
//! line process, minimized by weighted Gauss-Newton while the penalty's
//! scale `μ` is annealed from coarse to fine.

use super::correspondence::correspondences_from_features;
use super::global::check_feature_alignment;
use super::{evaluate_with_index, RegistrationResult};
use cv_core::point_cloud::PointCloud;
use cv_core::{exp_se3, rigid_transform, Error, Result};
use cv_point_cloud::{FPFHFeature, PointIndex};
use nalgebra::{Matrix3, Matrix4, Matrix6, Point3, Vector3, Vector6};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Options for Fast Global Registration
#[derive(Debug, Clone, PartialEq)]
pub struct FastGlobalRegistrationOption {
    /// Annealing divisor applied to `μ` every fourth iteration.
    pub division_factor: f64,
    /// Optimize in the clouds' own units instead of a unit-scale frame.
    pub use_absolute_scale: bool,
    /// Anneal `μ` (graduated non-convexity). Without it `μ` stays at 1.
    pub decrease_mu: bool,
    /// Lower bound for `μ` and inlier threshold of the final evaluation,
    /// in the clouds' units.
    pub maximum_correspondence_distance: f32,
    pub iteration_number: usize,
    /// Edge-length similarity required by the tuple test.
    pub tuple_scale: f64,
    pub maximum_tuple_count: usize,
    pub tuple_test: bool,
    /// Fixed RNG seed for the tuple test.
    pub seed: Option<u64>,
}

impl Default for FastGlobalRegistrationOption {
    fn default() -> Self {
        Self {
            division_factor: 1.4,
            use_absolute_scale: false,
            decrease_mu: true,
            maximum_correspondence_distance: 0.025,
            iteration_number: 64,
            tuple_scale: 0.95,
            maximum_tuple_count: 1000,
            tuple_test: true,
            seed: None,
        }
    }
}

impl FastGlobalRegistrationOption {
    /// Settings for clouds downsampled with voxel size `v`: correspondence
    /// distance `0.5v`.
    pub fn for_voxel_size(voxel_size: f32) -> Self {
        Self {
            maximum_correspondence_distance: voxel_size * 0.5,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        cv_core::ensure_positive(
            "maximum_correspondence_distance",
            self.maximum_correspondence_distance,
        )?;
        if !(self.division_factor > 1.0) {
            return Err(Error::invalid_parameter(format!(
                "division_factor must exceed 1, got {}",
                self.division_factor
            )));
        }
        if self.iteration_number == 0 {
            return Err(Error::invalid_parameter(
                "iteration_number must be at least 1",
            ));
        }
        if !(self.tuple_scale > 0.0 && self.tuple_scale < 1.0) {
            return Err(Error::invalid_parameter(format!(
                "tuple_scale must lie in (0, 1), got {}",
                self.tuple_scale
            )));
        }
        Ok(())
    }
}

/// Keep correspondences that form triangles of (nearly) equal side lengths
/// in both clouds. Accepted triples are appended as-is, so a pair may appear
/// more than once.
fn tuple_test(
    source: &PointCloud,
    target: &PointCloud,
    corres: &[(usize, usize)],
    option: &FastGlobalRegistrationOption,
) -> Vec<(usize, usize)> {
    let n = corres.len();
    let mut rng = match option.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let scale = option.tuple_scale as f32;
    let similar = |ls: f32, lt: f32| ls * scale < lt && lt < ls / scale;

    let mut tuples = Vec::new();
    let mut count = 0;
    for _ in 0..n * 100 {
        let picks = [
            corres[rng.gen_range(0..n)],
            corres[rng.gen_range(0..n)],
            corres[rng.gen_range(0..n)],
        ];
        let accepted = (0..3).all(|k| {
            let (si, ti) = picks[k];
            let (sj, tj) = picks[(k + 1) % 3];
            let ls = (source.points[si] - source.points[sj]).norm();
            let lt = (target.points[ti] - target.points[tj]).norm();
            similar(ls, lt)
        });
        if accepted {
            tuples.extend_from_slice(&picks);
            count += 1;
            if count >= option.maximum_tuple_count {
                break;
            }
        }
    }

    tracing::debug!(input = n, tuples = count, "FGR tuple test");
    tuples
}

/// Both clouds centred on their own means and divided by one shared scale.
struct NormalizedPair {
    source: Vec<Point3<f64>>,
    target: Vec<Point3<f64>>,
    source_mean: Vector3<f64>,
    target_mean: Vector3<f64>,
    scale: f64,
}

impl NormalizedPair {
    fn new(source: &PointCloud, target: &PointCloud, use_absolute_scale: bool) -> Self {
        let centred = |pc: &PointCloud| {
            let mean = pc.get_center().coords.cast::<f64>();
            let pts: Vec<Point3<f64>> = pc
                .points
                .iter()
                .map(|p| Point3::from(p.coords.cast::<f64>() - mean))
                .collect();
            (pts, mean)
        };
        let (mut src, source_mean) = centred(source);
        let (mut tgt, target_mean) = centred(target);

        let radius = src
            .iter()
            .chain(tgt.iter())
            .map(|p| p.coords.norm())
            .fold(0.0, f64::max);
        let scale = if use_absolute_scale || radius <= 0.0 {
            1.0
        } else {
            radius
        };
        for p in src.iter_mut().chain(tgt.iter_mut()) {
            *p = Point3::from(p.coords / scale);
        }

        Self {
            source: src,
            target: tgt,
            source_mean,
            target_mean,
            scale,
        }
    }

    /// Map a transform between the normalized clouds back to the originals:
    /// `t = s·t_n + μ_t - R μ_s`.
    fn denormalize(&self, transformation: &Matrix4<f64>) -> Matrix4<f32> {
        let rotation: Matrix3<f64> = transformation.fixed_view::<3, 3>(0, 0).into_owned();
        let t_n: Vector3<f64> = transformation.fixed_view::<3, 1>(0, 3).into_owned();
        let translation = t_n * self.scale + self.target_mean - rotation * self.source_mean;
        rigid_transform(&rotation.cast::<f32>(), &translation.cast::<f32>())
    }
}

/// Line-process Gauss-Newton over the normalized correspondences.
fn optimize_pairwise(
    pair: &NormalizedPair,
    corres: &[(usize, usize)],
    option: &FastGlobalRegistrationOption,
) -> Matrix4<f64> {
    let mut par = 1.0f64;
    let par_floor = option.maximum_correspondence_distance as f64 / pair.scale;
    let mut transformation = Matrix4::<f64>::identity();
    let mut moved = pair.source.clone();

    for itr in 0..option.iteration_number {
        if option.decrease_mu && itr % 4 == 0 && par > par_floor {
            par /= option.division_factor;
        }

        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        for &(i, j) in corres {
            let p = moved[i];
            let r = p - pair.target[j];
            let weight = (par / (r.norm_squared() + par)).powi(2);

            // d(T p)/dξ for ξ = [v; ω]
            let rows = [
                (Vector6::new(1.0, 0.0, 0.0, 0.0, p.z, -p.y), r.x),
                (Vector6::new(0.0, 1.0, 0.0, -p.z, 0.0, p.x), r.y),
                (Vector6::new(0.0, 0.0, 1.0, p.y, -p.x, 0.0), r.z),
            ];
            for (row, residual) in rows {
                jtj += row * row.transpose() * weight;
                jtr += row * (residual * weight);
            }
        }

        let Some(delta) = jtj.lu().solve(&(-jtr)) else {
            tracing::debug!(iteration = itr, "FGR normal equations singular");
            break;
        };
        let step = exp_se3(&delta.cast::<f32>()).cast::<f64>();
        transformation = step * transformation;
        for p in moved.iter_mut() {
            *p = step.transform_point(p);
        }
    }

    transformation
}

/// Fast Global Registration (FGR) - alternative to RANSAC
///
/// Uses reciprocal feature correspondences filtered by the tuple test, then
/// optimizes one transform over all of them. Deterministic given a seed;
/// much faster than RANSAC but more sensitive to poor features.
///
/// Fewer than 3 surviving correspondences yield
/// `RegistrationResult::identity()`.
pub fn registration_fgr_based_on_feature_matching(
    source: &PointCloud,
    target: &PointCloud,
    source_features: &[FPFHFeature],
    target_features: &[FPFHFeature],
    option: &FastGlobalRegistrationOption,
) -> Result<RegistrationResult> {
    option.validate()?;
    check_feature_alignment(source, source_features, "source")?;
    check_feature_alignment(target, target_features, "target")?;

    let mut corres = correspondences_from_features(source_features, target_features, true);
    if option.tuple_test && corres.len() >= 3 {
        corres = tuple_test(source, target, &corres, option);
    }
    if corres.len() < 3 {
        tracing::warn!(
            correspondences = corres.len(),
            "not enough correspondences for FGR, returning identity"
        );
        return Ok(RegistrationResult::identity());
    }

    let pair = NormalizedPair::new(source, target, option.use_absolute_scale);
    let normalized = optimize_pairwise(&pair, &corres, option);
    let transformation = pair.denormalize(&normalized);

    let target_index = PointIndex::from_cloud(target);
    let moved: Vec<Point3<f32>> = source
        .points
        .iter()
        .map(|p| transformation.transform_point(p))
        .collect();
    let result = evaluate_with_index(
        &moved,
        &target_index,
        option.maximum_correspondence_distance,
        &transformation,
    );

    tracing::info!(
        correspondences = corres.len(),
        fitness = result.fitness,
        rmse = result.inlier_rmse,
        "FGR global registration"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::{axis_angle_rotation, transform_error};

    fn scattered(n: usize) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(42);
        PointCloud::new(
            (0..n)
                .map(|_| {
                    Point3::new(
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-0.5..0.5),
                        rng.gen_range(0.0..2.0),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_optimizer_recovers_transform_from_clean_correspondences() {
        let source = scattered(60);
        let truth = rigid_transform(
            &axis_angle_rotation(&Vector3::new(0.2, 1.0, 0.1), 0.6),
            &Vector3::new(0.3, -0.2, 1.0),
        );
        let target = source.transformed(&truth);
        let corres: Vec<(usize, usize)> = (0..source.len()).map(|i| (i, i)).collect();

        let option = FastGlobalRegistrationOption::for_voxel_size(0.02);
        let pair = NormalizedPair::new(&source, &target, false);
        let estimate = pair.denormalize(&optimize_pairwise(&pair, &corres, &option));

        let (rot, trans) = transform_error(&estimate, &truth);
        assert!(rot < 1e-3, "rotation error {}", rot);
        assert!(trans < 1e-3, "translation error {}", trans);
    }

    #[test]
    fn test_tuple_test_rejects_inconsistent_pairs() {
        let source = scattered(30);
        let target = source.clone();
        // half identity pairs, half scrambled
        let mut corres: Vec<(usize, usize)> = (0..15).map(|i| (i, i)).collect();
        corres.extend((15..30).map(|i| (i, 44 - i)));

        let option = FastGlobalRegistrationOption {
            seed: Some(3),
            ..Default::default()
        };
        let kept = tuple_test(&source, &target, &corres, &option);
        assert!(!kept.is_empty());
        assert_eq!(kept.len() % 3, 0);
        let consistent = kept.iter().filter(|(s, t)| s == t).count();
        assert!(consistent as f32 / kept.len() as f32 > 0.8);
    }

    #[test]
    fn test_normalization_round_trip() {
        let source = scattered(20);
        let mut target = source.clone();
        target.translate(&Vector3::new(5.0, 0.0, 0.0));
        let pair = NormalizedPair::new(&source, &target, false);
        assert!(pair.scale > 0.0);
        // identity between the centred clouds maps back to the pure shift
        let t = pair.denormalize(&Matrix4::identity());
        assert_relative_eq!(t[(0, 3)], 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_validate() {
        assert!(FastGlobalRegistrationOption::default().validate().is_ok());
        assert!(FastGlobalRegistrationOption::for_voxel_size(-1.0)
            .validate()
            .is_err());
        let bad = FastGlobalRegistrationOption {
            division_factor: 1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = FastGlobalRegistrationOption {
            iteration_number: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter(_))));
    }
}
