use super::estimation::TransformationEstimationPointToPoint;
use super::{evaluate_with_index, RegistrationResult};
use cv_core::point_cloud::PointCloud;
use cv_core::{Error, Result};
use cv_point_cloud::PointIndex;
use nalgebra::Matrix4;

/// ICP stopping rule.
///
/// Iteration stops once both fitness and RMSE change by less than their
/// tolerance between consecutive iterations, or after `max_iteration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ICPConvergenceCriteria {
    pub relative_fitness: f32,
    pub relative_rmse: f32,
    pub max_iteration: usize,
}

impl Default for ICPConvergenceCriteria {
    fn default() -> Self {
        Self {
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
            max_iteration: 30,
        }
    }
}

impl ICPConvergenceCriteria {
    pub fn validate(&self) -> Result<()> {
        if !(self.relative_fitness >= 0.0 && self.relative_rmse >= 0.0) {
            return Err(Error::invalid_parameter(
                "ICP tolerances must be non-negative",
            ));
        }
        if self.max_iteration == 0 {
            return Err(Error::invalid_parameter("ICP max_iteration must be at least 1"));
        }
        Ok(())
    }
}

/// Point-to-point ICP registration
///
/// Registers `source` onto `target` starting from `init`.
///
/// # Algorithm
///
/// Iteratively:
/// 1. Find nearest neighbours between transformed source and target within
///    `max_correspondence_distance`
/// 2. Solve the closed-form transform minimizing squared point distances
/// 3. Compose it onto the current estimate and repeat until fitness and RMSE
///    settle, the iteration cap is reached, or no correspondences remain
///
/// # Returns
///
/// The refined result. An empty source or target yields `init` with zero
/// fitness. The target index is built once for all iterations.
pub fn registration_icp(
    source: &PointCloud,
    target: &PointCloud,
    max_correspondence_distance: f32,
    init: &Matrix4<f32>,
    estimation: &TransformationEstimationPointToPoint,
    criteria: &ICPConvergenceCriteria,
) -> Result<RegistrationResult> {
    cv_core::ensure_positive("max_correspondence_distance", max_correspondence_distance)?;
    criteria.validate()?;

    if source.is_empty() || target.is_empty() {
        tracing::warn!(
            source = source.len(),
            target = target.len(),
            "ICP on an empty cloud, returning the initial transform"
        );
        return Ok(RegistrationResult::with_transformation(*init));
    }

    let target_index = PointIndex::from_cloud(target);
    let mut moved = source.transformed(init);
    let mut transformation = *init;
    let mut result = evaluate_with_index(
        &moved.points,
        &target_index,
        max_correspondence_distance,
        &transformation,
    );

    let mut iterations = 0;
    while iterations < criteria.max_iteration {
        if result.correspondence_set.is_empty() {
            break;
        }
        iterations += 1;

        let update = estimation.compute_transformation(&moved, target, &result.correspondence_set);
        transformation = update * transformation;
        moved.transform(&update);

        let previous = result;
        result = evaluate_with_index(
            &moved.points,
            &target_index,
            max_correspondence_distance,
            &transformation,
        );

        tracing::debug!(
            iteration = iterations,
            fitness = result.fitness,
            rmse = result.inlier_rmse,
            "ICP step"
        );

        if (previous.fitness - result.fitness).abs() < criteria.relative_fitness
            && (previous.inlier_rmse - result.inlier_rmse).abs() < criteria.relative_rmse
        {
            break;
        }
    }

    if result.correspondence_set.is_empty() {
        tracing::warn!("ICP found no correspondences within the threshold");
    }
    tracing::info!(
        iterations,
        fitness = result.fitness,
        rmse = result.inlier_rmse,
        "ICP refinement"
    );
    Ok(result)
}
