//! Global registration by RANSAC over feature correspondences.

use super::correspondence::{correspondences_from_features, CorrespondenceChecker};
use super::estimation::TransformationEstimationPointToPoint;
use super::{evaluate_with_index, RegistrationResult};
use cv_core::point_cloud::PointCloud;
use cv_core::{Error, Ransac, Result, RobustConfig, RobustModel};
use cv_point_cloud::{FPFHFeature, PointIndex};
use nalgebra::{Matrix4, Point3};

/// When to stop drawing RANSAC hypotheses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RANSACConvergenceCriteria {
    /// Hard cap on drawn samples.
    pub max_iteration: usize,
    /// Probability of having drawn at least one all-inlier sample; the
    /// iteration budget shrinks as the inlier ratio improves.
    pub confidence: f64,
}

impl Default for RANSACConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iteration: 100_000,
            confidence: 0.999,
        }
    }
}

/// Options for feature-matching RANSAC
#[derive(Debug, Clone)]
pub struct RansacOptions {
    pub mutual_filter: bool,
    pub max_correspondence_distance: f32,
    pub estimation: TransformationEstimationPointToPoint,
    /// Correspondences per hypothesis.
    pub ransac_n: usize,
    pub checkers: Vec<CorrespondenceChecker>,
    pub criteria: RANSACConvergenceCriteria,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self::for_voxel_size(0.05)
    }
}

impl RansacOptions {
    /// Settings for clouds downsampled with voxel size `v`: inlier threshold
    /// `1.5v`, edge-length similarity 0.9 and distance check `1.5v`.
    pub fn for_voxel_size(voxel_size: f32) -> Self {
        let distance_threshold = voxel_size * 1.5;
        Self {
            mutual_filter: true,
            max_correspondence_distance: distance_threshold,
            estimation: TransformationEstimationPointToPoint::default(),
            ransac_n: 3,
            checkers: vec![
                CorrespondenceChecker::EdgeLength {
                    similarity_threshold: 0.9,
                },
                CorrespondenceChecker::Distance { distance_threshold },
            ],
            criteria: RANSACConvergenceCriteria::default(),
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        cv_core::ensure_positive(
            "max_correspondence_distance",
            self.max_correspondence_distance,
        )?;
        if self.ransac_n < 3 {
            return Err(Error::invalid_parameter(format!(
                "ransac_n must be at least 3, got {}",
                self.ransac_n
            )));
        }
        if self.criteria.max_iteration == 0 {
            return Err(Error::invalid_parameter("max_iteration must be at least 1"));
        }
        if !(self.criteria.confidence > 0.0 && self.criteria.confidence <= 1.0) {
            return Err(Error::invalid_parameter(format!(
                "confidence must lie in (0, 1], got {}",
                self.criteria.confidence
            )));
        }
        Ok(())
    }
}

/// Rigid (or similarity) transform hypothesised from correspondence samples.
struct CorrespondenceModel<'a> {
    source: &'a PointCloud,
    target: &'a PointCloud,
    options: &'a RansacOptions,
}

impl CorrespondenceModel<'_> {
    fn pairs(&self, sample: &[&(usize, usize)]) -> Vec<(usize, usize)> {
        sample.iter().map(|&&c| c).collect()
    }

    fn passes(&self, sample: &[&(usize, usize)], model: Option<&Matrix4<f32>>) -> bool {
        let corres = self.pairs(sample);
        self.options
            .checkers
            .iter()
            .filter(|c| c.requires_transformation() == model.is_some())
            .all(|c| {
                let t = model.copied().unwrap_or_else(Matrix4::identity);
                c.check(self.source, self.target, &corres, &t)
            })
    }
}

impl RobustModel<(usize, usize)> for CorrespondenceModel<'_> {
    type Model = Matrix4<f32>;

    fn min_sample_size(&self) -> usize {
        self.options.ransac_n
    }

    fn estimate(&self, data: &[&(usize, usize)]) -> Option<Self::Model> {
        let pairs: Vec<(Point3<f32>, Point3<f32>)> = data
            .iter()
            .map(|&&(s, t)| (self.source.points[s], self.target.points[t]))
            .collect();
        self.options.estimation.estimate(&pairs)
    }

    fn compute_error(&self, model: &Self::Model, data: &(usize, usize)) -> f64 {
        let moved = model.transform_point(&self.source.points[data.0]);
        (moved - self.target.points[data.1]).norm() as f64
    }

    fn is_sample_valid(&self, sample: &[&(usize, usize)]) -> bool {
        self.passes(sample, None)
    }

    fn is_model_valid(&self, model: &Self::Model, sample: &[&(usize, usize)]) -> bool {
        self.passes(sample, Some(model))
    }
}

/// RANSAC registration from feature matching
///
/// Matches FPFH features, then repeatedly samples `ransac_n` correspondences,
/// estimates a transform and scores it by the number of correspondences it
/// brings within `max_correspondence_distance`. Checkers prune samples and
/// hypotheses before scoring.
///
/// # Arguments
///
/// * `source` / `target` - Downsampled clouds the features were computed on
/// * `source_features` / `target_features` - One feature per point
/// * `options` - Thresholds, checkers and stopping criteria
///
/// # Returns
///
/// The best hypothesis, refit on its inlier correspondences and evaluated
/// against the clouds. When too few correspondences exist or no hypothesis
/// survives the checkers, `RegistrationResult::identity()` is returned.
///
/// # Errors
///
/// `InvalidInput` if a feature set is not index-aligned with its cloud,
/// `InvalidParameter` for unusable options.
pub fn registration_ransac_based_on_feature_matching(
    source: &PointCloud,
    target: &PointCloud,
    source_features: &[FPFHFeature],
    target_features: &[FPFHFeature],
    options: &RansacOptions,
) -> Result<RegistrationResult> {
    options.validate()?;
    check_feature_alignment(source, source_features, "source")?;
    check_feature_alignment(target, target_features, "target")?;

    let mut corres =
        correspondences_from_features(source_features, target_features, options.mutual_filter);
    if options.mutual_filter && corres.len() < options.ransac_n * 3 {
        tracing::warn!(
            mutual = corres.len(),
            "too few mutual correspondences, falling back to one-way matches"
        );
        corres = correspondences_from_features(source_features, target_features, false);
    }
    tracing::debug!(correspondences = corres.len(), "feature matching");

    if corres.len() < options.ransac_n {
        tracing::warn!(
            correspondences = corres.len(),
            "not enough correspondences for RANSAC, returning identity"
        );
        return Ok(RegistrationResult::identity());
    }

    let model = CorrespondenceModel {
        source,
        target,
        options,
    };
    let outcome = ransac_engine(options).run(&model, &corres);

    let Some(best) = outcome.model else {
        tracing::warn!(
            iterations = outcome.iterations,
            "no RANSAC hypothesis passed the checkers, returning identity"
        );
        return Ok(RegistrationResult::identity());
    };

    let inliers: Vec<(usize, usize)> = corres
        .iter()
        .zip(&outcome.inliers)
        .filter_map(|(&c, &keep)| keep.then_some(c))
        .collect();

    let target_index = PointIndex::from_cloud(target);
    let score = |t: &Matrix4<f32>| {
        let moved: Vec<Point3<f32>> = source.points.iter().map(|p| t.transform_point(p)).collect();
        evaluate_with_index(&moved, &target_index, options.max_correspondence_distance, t)
    };

    let mut result = score(&best);
    if inliers.len() >= 3 {
        let refit = options
            .estimation
            .compute_transformation(source, target, &inliers);
        let refined = score(&refit);
        if !result.is_better_than(&refined) {
            result = refined;
        }
    }

    tracing::info!(
        iterations = outcome.iterations,
        inliers = inliers.len(),
        fitness = result.fitness,
        rmse = result.inlier_rmse,
        "RANSAC global registration"
    );
    Ok(result)
}

fn ransac_engine<'a>(options: &RansacOptions) -> Ransac<(usize, usize), CorrespondenceModel<'a>> {
    Ransac::new(RobustConfig {
        threshold: options.max_correspondence_distance as f64,
        max_iterations: options.criteria.max_iteration,
        confidence: options.criteria.confidence,
        seed: options.seed,
    })
}

pub(crate) fn check_feature_alignment(
    cloud: &PointCloud,
    features: &[FPFHFeature],
    which: &str,
) -> Result<()> {
    if cloud.len() == features.len() {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "{} has {} points but {} features",
            which,
            cloud.len(),
            features.len()
        )))
    }
}
