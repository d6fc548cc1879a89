//! 3D Registration Module
//!
//! Implements the registration chain used to align two scans:
//! - Global Registration (RANSAC, FGR) over FPFH correspondences
//! - Point-to-point ICP refinement
//! - Registration evaluation (fitness / inlier RMSE)

pub mod correspondence;
pub mod estimation;
pub mod fgr;
pub mod global;
pub mod icp;

pub use correspondence::{correspondences_from_features, CorrespondenceChecker};
pub use estimation::TransformationEstimationPointToPoint;
pub use fgr::{registration_fgr_based_on_feature_matching, FastGlobalRegistrationOption};
pub use global::{
    registration_ransac_based_on_feature_matching, RANSACConvergenceCriteria, RansacOptions,
};
pub use icp::{registration_icp, ICPConvergenceCriteria};
pub use cv_core::{Error, Result};

use cv_core::point_cloud::PointCloud;
use cv_point_cloud::PointIndex;
use nalgebra::{Matrix4, Point3};
use rayon::prelude::*;

/// Registration result
///
/// Contains the estimated rigid transformation and quality metrics.
///
/// # Fields
///
/// * `transformation` - 4×4 homogeneous matrix mapping source onto target
/// * `fitness` - Fraction of source points with a correspondence within the threshold (0-1)
/// * `inlier_rmse` - Root mean square distance over those correspondences
/// * `correspondence_set` - `(source index, target index)` pairs behind the metrics
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    pub transformation: Matrix4<f32>,
    pub fitness: f32,
    pub inlier_rmse: f32,
    pub correspondence_set: Vec<(usize, usize)>,
}

impl RegistrationResult {
    /// Low-fitness sentinel: identity transform, no correspondences.
    ///
    /// Returned when the input is too degenerate to register. Callers must
    /// check `fitness` before trusting the transform.
    pub fn identity() -> Self {
        Self::with_transformation(Matrix4::identity())
    }

    pub fn with_transformation(transformation: Matrix4<f32>) -> Self {
        Self {
            transformation,
            fitness: 0.0,
            inlier_rmse: 0.0,
            correspondence_set: Vec::new(),
        }
    }

    /// Higher fitness wins; equal fitness is broken by lower RMSE.
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.fitness > other.fitness
            || (self.fitness == other.fitness && self.inlier_rmse < other.inlier_rmse)
    }
}

/// Nearest-neighbour correspondences of already-transformed `points` in the
/// indexed target, scored against `transformation`.
pub(crate) fn evaluate_with_index(
    points: &[Point3<f32>],
    target_index: &PointIndex,
    max_correspondence_distance: f32,
    transformation: &Matrix4<f32>,
) -> RegistrationResult {
    let max_d2 = max_correspondence_distance * max_correspondence_distance;

    let matches: Vec<(usize, usize, f32)> = points
        .par_iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let (j, d2) = target_index.nearest(p)?;
            (d2 <= max_d2).then_some((i, j, d2))
        })
        .collect();

    let error: f64 = matches.iter().map(|&(_, _, d2)| d2 as f64).sum();
    let fitness = if points.is_empty() {
        0.0
    } else {
        matches.len() as f32 / points.len() as f32
    };
    let inlier_rmse = if matches.is_empty() {
        0.0
    } else {
        (error / matches.len() as f64).sqrt() as f32
    };

    RegistrationResult {
        transformation: *transformation,
        fitness,
        inlier_rmse,
        correspondence_set: matches.into_iter().map(|(i, j, _)| (i, j)).collect(),
    }
}

/// Evaluate registration quality
///
/// Applies `transformation` to `source` and matches every point to its
/// nearest neighbour in `target`, keeping matches within
/// `max_correspondence_distance`.
///
/// # Returns
///
/// `fitness` = matches / source points (0 for an empty source), `inlier_rmse`
/// over the matched distances (0 when nothing matched).
pub fn evaluate_registration(
    source: &PointCloud,
    target: &PointCloud,
    max_correspondence_distance: f32,
    transformation: &Matrix4<f32>,
) -> Result<RegistrationResult> {
    cv_core::ensure_positive("max_correspondence_distance", max_correspondence_distance)?;

    let target_index = PointIndex::from_cloud(target);
    let moved: Vec<Point3<f32>> = source
        .points
        .iter()
        .map(|p| transformation.transform_point(p))
        .collect();
    Ok(evaluate_with_index(
        &moved,
        &target_index,
        max_correspondence_distance,
        transformation,
    ))
}
